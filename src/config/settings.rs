//! Application settings shared by the daemon, panel and CLI
//!
//! Stored as JSON under the XDG config directory. Every field has a serde
//! default so a partial (or missing) file still yields a usable setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants::{ipc, paths, resume, ryzenadj};

/// How the reconciler treats responses that resolve out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Whichever response resolves last is displayed
    #[default]
    LastResolved,
    /// Responses older than the newest displayed one are dropped
    LastIssued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_ryzenadj_path")]
    pub ryzenadj_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_resume_poll_interval_ms")]
    pub resume_poll_interval_ms: u64,
    #[serde(default = "default_resume_gap_threshold_ms")]
    pub resume_gap_threshold_ms: u64,
    #[serde(default)]
    pub response_ordering: ResponseOrdering,
}

fn default_ryzenadj_path() -> PathBuf {
    PathBuf::from(ryzenadj::DEFAULT_PATH)
}

fn default_socket_mode() -> u32 {
    ipc::DEFAULT_SOCKET_MODE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resume_poll_interval_ms() -> u64 {
    resume::DEFAULT_POLL_INTERVAL_MS
}

fn default_resume_gap_threshold_ms() -> u64 {
    resume::DEFAULT_GAP_THRESHOLD_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ryzenadj_path: default_ryzenadj_path(),
            socket_path: None,
            socket_mode: default_socket_mode(),
            state_path: None,
            log_level: default_log_level(),
            resume_poll_interval_ms: default_resume_poll_interval_ms(),
            resume_gap_threshold_ms: default_resume_gap_threshold_ms(),
            response_ordering: ResponseOrdering::default(),
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(paths::APP_DIR);
        path.push(paths::SETTINGS_FILENAME);
        path
    }

    /// Load settings from `path` (or the default location); missing file means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let settings = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
                info!(path = %path.display(), "Loaded settings");
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read settings file {}", path.display())),
        }
    }

    /// Write settings as pretty JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Backend socket: settings value, then `DECK_RYZENADJ_SOCKET`, then the system default
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .or_else(|| std::env::var_os(paths::SOCKET_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_SOCKET))
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_STATE_FILE))
    }

    pub fn resume_poll_interval(&self) -> Duration {
        Duration::from_millis(self.resume_poll_interval_ms)
    }

    pub fn resume_gap_threshold(&self) -> Duration {
        Duration::from_millis(self.resume_gap_threshold_ms)
    }
}
