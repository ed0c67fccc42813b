//! Sliders and toggles bound to the tuning configuration

use eframe::egui;

use crate::config::{ConfigChange, Configuration};
use crate::constants::limits;
use crate::gui::constants::{ITEM_SPACING, SECTION_SPACING};

/// Renders the controls and returns the edits made this frame
pub fn ui(ui: &mut egui::Ui, config: &Configuration) -> Vec<ConfigChange> {
    let mut changes = Vec::new();
    let mut edit = config.clone();

    ui.group(|ui| {
        ui.label(egui::RichText::new("CPU").heading().strong());
        ui.add_space(ITEM_SPACING);

        if ui.checkbox(&mut edit.apply_cpu_offset, "Apply CPU Offset").changed() {
            changes.push(ConfigChange::ApplyCpuOffset(edit.apply_cpu_offset));
        }
        if ui
            .add(
                egui::Slider::new(&mut edit.cpu_offset, limits::OFFSET_MIN..=limits::OFFSET_MAX)
                    .text("CPU Offset"),
            )
            .changed()
        {
            changes.push(ConfigChange::SetCpuOffset(edit.cpu_offset));
        }
    });

    ui.add_space(SECTION_SPACING);

    ui.group(|ui| {
        ui.label(egui::RichText::new("GPU").heading().strong());
        ui.add_space(ITEM_SPACING);

        if ui.checkbox(&mut edit.apply_gpu_offset, "Apply GPU Offset").changed() {
            changes.push(ConfigChange::ApplyGpuOffset(edit.apply_gpu_offset));
        }
        if ui
            .add(
                egui::Slider::new(&mut edit.gpu_offset, limits::OFFSET_MIN..=limits::OFFSET_MAX)
                    .text("GPU Offset"),
            )
            .changed()
        {
            changes.push(ConfigChange::SetGpuOffset(edit.gpu_offset));
        }
    });

    ui.add_space(SECTION_SPACING);

    ui.group(|ui| {
        ui.label(egui::RichText::new("Power").heading().strong());
        ui.add_space(ITEM_SPACING);

        if ui.checkbox(&mut edit.apply_power_limit, "Apply Power Limit").changed() {
            changes.push(ConfigChange::ApplyPowerLimit(edit.apply_power_limit));
        }
        if ui
            .add(
                egui::Slider::new(
                    &mut edit.power_limit_mw,
                    limits::POWER_LIMIT_MIN_MW..=limits::POWER_LIMIT_MAX_MW,
                )
                .step_by(f64::from(limits::POWER_LIMIT_STEP_MW))
                .suffix(" mW")
                .text("Power Limit"),
            )
            .changed()
        {
            changes.push(ConfigChange::SetPowerLimit(edit.power_limit_mw));
        }
    });

    ui.add_space(SECTION_SPACING);

    if ui.checkbox(&mut edit.show_debug, "Show Debug Information").changed() {
        changes.push(ConfigChange::ShowDebug(edit.show_debug));
    }

    changes
}
