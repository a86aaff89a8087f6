use std::path::{Path, PathBuf};

use serde::Deserialize;

use cadenza_types::Transport;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const DEFAULT_MAX_UNDO: usize = 200;
const DEFAULT_TICKS_PER_BEAT: u32 = 480;
const DEFAULT_QUOTA_BYTES: usize = 64 * 1024;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    undo: UndoConfig,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    preferences: PreferencesConfig,
}

#[derive(Deserialize, Default)]
struct UndoConfig {
    max_entries: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RoutingConfig {
    allow_modulation_feedback: Option<bool>,
}

#[derive(Deserialize, Default)]
struct TransportConfig {
    tempo: Option<f64>,
    time_signature: Option<[u8; 2]>,
    ticks_per_beat: Option<u32>,
}

#[derive(Deserialize, Default)]
struct PreferencesConfig {
    quota_bytes: Option<usize>,
}

pub struct Config {
    undo: UndoConfig,
    routing: RoutingConfig,
    transport: TransportConfig,
    preferences: PreferencesConfig,
}

impl Config {
    /// Embedded defaults merged with `~/.config/cadenza/config.toml` if present.
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    /// Embedded defaults merged with the file at `path`. A missing or
    /// malformed file is logged and ignored.
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut base = match toml::from_str::<ConfigFile>(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is invalid: {}", e);
                ConfigFile::default()
            }
        };

        if let Some(path) = path.filter(|p| p.exists()) {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(user) => merge(&mut base, user),
                    Err(e) => {
                        log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                    }
                },
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                }
            }
        }

        Config {
            undo: base.undo,
            routing: base.routing,
            transport: base.transport,
            preferences: base.preferences,
        }
    }

    /// Built-in defaults only, ignoring any user file.
    pub fn embedded() -> Self {
        Self::load_from(None)
    }

    pub fn max_undo_entries(&self) -> usize {
        self.undo.max_entries.unwrap_or(DEFAULT_MAX_UNDO).max(1)
    }

    pub fn allow_modulation_feedback(&self) -> bool {
        self.routing.allow_modulation_feedback.unwrap_or(true)
    }

    /// Transport used for a fresh active context.
    pub fn transport(&self) -> Transport {
        let fallback = Transport::default();
        let (num, den) = self
            .transport
            .time_signature
            .map(|ts| (ts[0], ts[1]))
            .filter(|&(num, den)| num > 0 && den.is_power_of_two())
            .unwrap_or((fallback.time_sig_num, fallback.time_sig_den));
        Transport {
            tempo: self
                .transport
                .tempo
                .filter(|t| t.is_finite() && *t > 0.0)
                .unwrap_or(fallback.tempo),
            time_sig_num: num,
            time_sig_den: den,
            ..fallback
        }
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.transport
            .ticks_per_beat
            .filter(|&t| t > 0)
            .unwrap_or(DEFAULT_TICKS_PER_BEAT)
    }

    pub fn preference_quota_bytes(&self) -> usize {
        self.preferences.quota_bytes.unwrap_or(DEFAULT_QUOTA_BYTES)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::embedded()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadenza").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.undo.max_entries.is_some() {
        base.undo.max_entries = user.undo.max_entries;
    }
    if user.routing.allow_modulation_feedback.is_some() {
        base.routing.allow_modulation_feedback = user.routing.allow_modulation_feedback;
    }
    if user.transport.tempo.is_some() {
        base.transport.tempo = user.transport.tempo;
    }
    if user.transport.time_signature.is_some() {
        base.transport.time_signature = user.transport.time_signature;
    }
    if user.transport.ticks_per_beat.is_some() {
        base.transport.ticks_per_beat = user.transport.ticks_per_beat;
    }
    if user.preferences.quota_bytes.is_some() {
        base.preferences.quota_bytes = user.preferences.quota_bytes;
    }
}
