//! Last operation result and optional ryzenadj diagnostics

use eframe::egui;

use crate::gui::constants::{ITEM_SPACING, STATUS_ERROR, STATUS_OK};
use crate::reconciler::OperationResult;

/// One-line outcome and whether it is a success
pub fn summary(result: &OperationResult) -> (String, bool) {
    match result {
        OperationResult::Success { applied, .. } => (
            format!(
                "Successfully applied: CPU {} / GPU {}",
                applied.cpu_offset, applied.gpu_offset
            ),
            true,
        ),
        OperationResult::Failure { message } => {
            (format!("Failed to apply configuration: {message}"), false)
        }
    }
}

/// Debug rows for the diagnostics section
pub fn debug_lines(result: Option<&OperationResult>) -> Vec<String> {
    match result {
        None => vec!["Result currently undefined".to_string()],
        Some(OperationResult::Failure { .. }) => {
            vec!["Result unsuccessful -- see above".to_string()]
        }
        Some(OperationResult::Success {
            diagnostics: None,
            received_at,
            ..
        }) => vec![
            "ryzenadj not executed (nothing changed)".to_string(),
            format!("time: {}", received_at.format("%H:%M:%S%.3f")),
        ],
        Some(OperationResult::Success {
            diagnostics: Some(invocation),
            ..
        }) => vec![
            format!("cmd: {}", invocation.command),
            format!("stdout: {}", invocation.stdout.trim_end()),
            format!("stderr: {}", invocation.stderr.trim_end()),
            format!("time: {}", invocation.timestamp.format("%H:%M:%S%.3f")),
        ],
    }
}

pub fn ui(ui: &mut egui::Ui, result: Option<&OperationResult>, show_debug: bool) {
    if let Some(result) = result {
        let (text, ok) = summary(result);
        ui.colored_label(if ok { STATUS_OK } else { STATUS_ERROR }, text);
    }

    if show_debug {
        ui.add_space(ITEM_SPACING);
        ui.group(|ui| {
            for line in debug_lines(result) {
                ui.label(egui::RichText::new(line).monospace());
            }
        });
    }
}
