//! Persistent state for the backend daemon
//!
//! The daemon owns the last successfully applied configuration and writes it
//! to disk after every successful ryzenadj run, so the same tuning is
//! restored when the daemon starts again.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::configuration::Configuration;

/// On-disk record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    pub configuration: Configuration,
    pub saved_at: DateTime<Local>,
}

/// Reads and writes [`SavedState`] at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved configuration, `None` if nothing was saved yet
    pub fn load(&self) -> Result<Option<Configuration>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved daemon state");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read daemon state {}", self.path.display())
                });
            }
        };

        let saved: SavedState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse daemon state {}", self.path.display()))?;
        let configuration = saved.configuration.sanitized();
        configuration.validate().with_context(|| {
            format!("Saved configuration in {} is out of range", self.path.display())
        })?;
        info!(path = %self.path.display(), saved_at = %saved.saved_at, "Loaded saved configuration");
        Ok(Some(configuration))
    }

    /// Atomically replace the saved configuration (write temp file, then rename)
    pub fn save(&self, configuration: &Configuration) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory {}", parent.display()))?;
        }

        let saved = SavedState {
            configuration: configuration.clone(),
            saved_at: Local::now(),
        };
        let json = serde_json::to_string_pretty(&saved).context("Failed to serialize daemon state")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write daemon state {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move daemon state into {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Saved daemon state");
        Ok(())
    }
}
