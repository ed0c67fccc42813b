//! Configuration management for deck-ryzenadj
//!
//! This module provides three pieces:
//! - **configuration**: the tuning record exchanged with the backend
//! - **settings**: application settings (paths, logging, resume detection)
//! - **daemon_state**: the backend's persisted last-applied configuration

pub mod configuration;
pub mod daemon_state;
pub mod settings;

// Re-export commonly used types
pub use configuration::{ConfigChange, Configuration, Field};
pub use daemon_state::StateStore;
pub use settings::{ResponseOrdering, Settings};
