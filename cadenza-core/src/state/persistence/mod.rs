
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cadenza_types::{CoreError, CoreResult, ProjectSnapshot, SNAPSHOT_VERSION};

/// Render a snapshot as pretty JSON. Lists keep creation order, so the same
/// snapshot always renders to the same bytes.
pub fn serialize_snapshot(snapshot: &ProjectSnapshot) -> CoreResult<String> {
    let mut json = serde_json::to_string_pretty(snapshot).map_err(|e| CoreError::Snapshot(e.to_string()))?;
    json.push('\n');
    Ok(json)
}

/// Parse a snapshot document, rejecting versions newer than this build.
pub fn deserialize_snapshot(json: &str) -> CoreResult<ProjectSnapshot> {
    #[derive(serde::Deserialize)]
    struct VersionHeader {
        version: u32,
    }

    let header: VersionHeader = serde_json::from_str(json).map_err(|e| CoreError::Snapshot(e.to_string()))?;
    if header.version > SNAPSHOT_VERSION {
        return Err(CoreError::UnsupportedVersion {
            found: header.version,
            supported: SNAPSHOT_VERSION,
        });
    }
    serde_json::from_str(json).map_err(|e| CoreError::Snapshot(e.to_string()))
}

/// Write a snapshot to `path`.
///
/// The document goes to a sibling temp file first and is renamed into place,
/// so an interrupted save leaves the previous file intact.
pub fn save_project(path: &Path, snapshot: &ProjectSnapshot) -> CoreResult<()> {
    let json = serialize_snapshot(snapshot)?;
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    log::info!(
        target: "persistence",
        "saved {} ({} streams, {} clips, {} nodes)",
        path.display(),
        snapshot.streams.len(),
        snapshot.clips.len(),
        snapshot.routing.nodes.len()
    );
    Ok(())
}

pub fn load_project(path: &Path) -> CoreResult<ProjectSnapshot> {
    let json = fs::read_to_string(path)?;
    let snapshot = deserialize_snapshot(&json)?;
    log::info!(target: "persistence", "loaded {} (version {})", path.display(), snapshot.version);
    Ok(snapshot)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "project.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
