//! Bridge message types for panel/CLI ↔ backend daemon communication

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Requests sent to the backend daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BackendRequest {
    /// Read the configuration the backend currently has applied
    ActiveState,

    /// Replace the configuration (complete record, not a diff)
    UpdateConfiguration(Configuration),

    /// The system came back from suspend; reassert the active configuration
    SystemResumed,

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Responses sent by the backend daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Active configuration (response to ActiveState)
    ActiveState {
        /// True only for the first query after the daemon started
        first_update: bool,
        state: Configuration,
    },

    /// Outcome of UpdateConfiguration
    Updated(UpdateReport),

    /// Acknowledgment that request was processed
    Ack,

    /// Health check response
    Pong,

    /// Error occurred; the text is meant to be shown to the user as-is
    Error(String),
}

/// Result of an UpdateConfiguration request that the backend accepted
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateReport {
    /// Configuration the backend now treats as active
    pub applied: Configuration,
    pub cpu_value: String,
    pub gpu_value: String,
    /// False when nothing hardware-relevant changed and ryzenadj was not run
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<Invocation>,
}

/// Trace of one ryzenadj run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: String,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub timestamp: DateTime<Local>,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}
