//! egui tuning panel

mod components;
mod constants;
mod panel;

pub use panel::run_panel;
