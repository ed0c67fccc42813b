//! GUI-specific constants for layout, status colors and intervals

/// Panel window dimensions (sized like the Steam quick access menu)
pub const WINDOW_WIDTH: f32 = 420.0;
pub const WINDOW_HEIGHT: f32 = 640.0;
pub const WINDOW_MIN_WIDTH: f32 = 360.0;
pub const WINDOW_MIN_HEIGHT: f32 = 480.0;

/// Layout spacing
pub const PADDING: f32 = 8.0;
pub const SECTION_SPACING: f32 = 15.0;
pub const ITEM_SPACING: f32 = 8.0;

/// Status colors
pub const STATUS_OK: egui::Color32 = egui::Color32::from_rgb(0, 200, 0);
pub const STATUS_ERROR: egui::Color32 = egui::Color32::from_rgb(200, 0, 0);
pub const STATUS_PENDING: egui::Color32 = egui::Color32::from_rgb(200, 200, 0);

/// Repaint cadence so async results show up without input
pub const REPAINT_INTERVAL_MS: u64 = 250;
