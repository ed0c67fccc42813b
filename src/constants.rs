//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// ryzenadj command-line interface
pub mod ryzenadj {
    /// Neutral curve optimiser register value (offset 0)
    pub const BASE_VALUE: i64 = 0x100000;

    /// All-core CPU curve optimiser flag
    pub const FLAG_CPU_OFFSET: &str = "--set-coall";

    /// iGPU curve optimiser flag
    pub const FLAG_GPU_OFFSET: &str = "--set-cogfx";

    /// Sustained power limit flag (mW)
    pub const FLAG_STAPM_LIMIT: &str = "--stapm-limit";

    /// Boost power limit flag (mW)
    pub const FLAG_FAST_LIMIT: &str = "--fast-limit";

    /// Average power limit flag (mW)
    pub const FLAG_SLOW_LIMIT: &str = "--slow-limit";

    /// Default location of the ryzenadj binary
    pub const DEFAULT_PATH: &str = "/usr/bin/ryzenadj";
}

/// Valid ranges for configuration values
pub mod limits {
    /// Most negative curve optimiser offset accepted
    pub const OFFSET_MIN: i32 = -30;

    /// Positive offsets are never applied (no overvolting)
    pub const OFFSET_MAX: i32 = 0;

    /// Lowest accepted power limit in milliwatts
    pub const POWER_LIMIT_MIN_MW: u32 = 3_000;

    /// Highest accepted power limit in milliwatts
    pub const POWER_LIMIT_MAX_MW: u32 = 30_000;

    /// Stock Steam Deck APU power limit
    pub const POWER_LIMIT_DEFAULT_MW: u32 = 15_000;

    /// Slider granularity for the power limit
    pub const POWER_LIMIT_STEP_MW: u32 = 500;
}

/// Filesystem locations
pub mod paths {
    /// Application directory name under XDG config
    pub const APP_DIR: &str = "deck-ryzenadj";

    /// Settings filename
    pub const SETTINGS_FILENAME: &str = "settings.json";

    /// Backend socket used when no override is configured
    pub const DEFAULT_SOCKET: &str = "/run/deck-ryzenadj/backend.sock";

    /// Environment override for the backend socket
    pub const SOCKET_ENV: &str = "DECK_RYZENADJ_SOCKET";

    /// Backend state file (last successfully applied configuration)
    pub const DEFAULT_STATE_FILE: &str = "/var/lib/deck-ryzenadj/state.json";
}

/// Bridge protocol
pub mod ipc {
    /// Maximum frame size (1 MiB); ryzenadj output is small
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Socket permissions; the panel runs unprivileged against a root daemon
    pub const DEFAULT_SOCKET_MODE: u32 = 0o666;

    /// Connect timeout for one-shot requests
    pub const CONNECT_TIMEOUT_MS: u64 = 2_000;
}

/// Resume-from-suspend detection
pub mod resume {
    /// How often boottime/monotonic clocks are sampled
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

    /// Clock divergence that counts as a suspend cycle
    pub const DEFAULT_GAP_THRESHOLD_MS: u64 = 1_500;
}
