//! Per-workspace UI preferences (panel sizes, zoom, last view and so on).
//!
//! A namespaced key/value map persisted as one JSON file under the user config
//! directory. Musical content never goes here.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

use cadenza_types::{CoreError, CoreResult};

use crate::config::Config;

type Namespace = BTreeMap<String, Value>;

pub struct PreferenceStore {
    path: Option<PathBuf>,
    quota_bytes: usize,
    namespaces: BTreeMap<String, Namespace>,
}

impl PreferenceStore {
    /// A store that is never written to disk.
    pub fn in_memory(quota_bytes: usize) -> Self {
        Self {
            path: None,
            quota_bytes,
            namespaces: BTreeMap::new(),
        }
    }

    /// Open the store backed by `path`. A missing file starts empty; an
    /// unreadable or malformed one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        let path = path.into();
        let namespaces = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(namespaces) => namespaces,
                Err(e) => {
                    log::warn!(target: "prefs", "ignoring malformed preferences {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!(target: "prefs", "could not read preferences {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            quota_bytes,
            namespaces,
        }
    }

    /// `~/.config/cadenza/preferences.json`, or an in-memory store when there
    /// is no config directory.
    pub fn open_default(config: &Config) -> Self {
        match default_path() {
            Some(path) => Self::open(path, config.preference_quota_bytes()),
            None => {
                log::warn!(target: "prefs", "no config directory; preferences will not persist");
                Self::in_memory(config.preference_quota_bytes())
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespaces.get(namespace)?.get(key)
    }

    /// Typed read; a value of the wrong shape reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let value = self.get(namespace, key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Store `value`. Fails with `QuotaExceeded`, leaving the store unchanged,
    /// if the namespace would outgrow its quota or the file cannot be written.
    pub fn set(&mut self, namespace: &str, key: &str, value: Value) -> CoreResult<()> {
        let mut next = self.namespaces.get(namespace).cloned().unwrap_or_default();
        next.insert(key.to_string(), value);
        let needed = encoded_len(&next);
        if needed > self.quota_bytes {
            return Err(CoreError::QuotaExceeded {
                namespace: namespace.to_string(),
                needed,
                quota: self.quota_bytes,
            });
        }
        let previous = self.namespaces.insert(namespace.to_string(), next);
        if let Err(e) = self.persist() {
            log::warn!(target: "prefs", "could not write preferences: {}", e);
            match previous {
                Some(previous) => self.namespaces.insert(namespace.to_string(), previous),
                None => self.namespaces.remove(namespace),
            };
            return Err(CoreError::QuotaExceeded {
                namespace: namespace.to_string(),
                needed,
                quota: self.quota_bytes,
            });
        }
        Ok(())
    }

    /// Drop one key. If the file cannot be written the key stays.
    pub fn remove(&mut self, namespace: &str, key: &str) -> CoreResult<Option<Value>> {
        let Some(previous) = self.namespaces.get(namespace).cloned() else {
            return Ok(None);
        };
        let mut next = previous.clone();
        let Some(removed) = next.remove(key) else {
            return Ok(None);
        };
        if next.is_empty() {
            self.namespaces.remove(namespace);
        } else {
            self.namespaces.insert(namespace.to_string(), next);
        }
        if let Err(e) = self.persist() {
            self.namespaces.insert(namespace.to_string(), previous);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Drop a whole namespace. If the file cannot be written nothing changes.
    pub fn clear_namespace(&mut self, namespace: &str) -> CoreResult<()> {
        let Some(previous) = self.namespaces.remove(namespace) else {
            return Ok(());
        };
        if let Err(e) = self.persist() {
            self.namespaces.insert(namespace.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    pub fn keys(&self, namespace: &str) -> Vec<&str> {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Encoded size of one namespace, as counted against the quota.
    pub fn namespace_bytes(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map(encoded_len).unwrap_or(0)
    }

    fn persist(&self) -> CoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.namespaces)
            .map_err(|e| CoreError::Io(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn encoded_len(namespace: &Namespace) -> usize {
    serde_json::to_vec(namespace).map(|v| v.len()).unwrap_or(usize::MAX)
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadenza").join("preferences.json"))
}
