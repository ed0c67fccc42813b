//! Tuning panel implemented with egui/eframe
//!
//! The panel owns a tokio runtime for bridge calls. Every edit spawns its own
//! request, and the frame always renders from a fresh reconciler snapshot.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use eframe::{egui, CreationContext, NativeOptions};
use tracing::{error, info};

use super::components::{result_view, tuning_controls};
use super::constants::*;
use crate::config::{ConfigChange, Configuration, Settings};
use crate::ipc::SocketBridge;
use crate::reconciler::{Reconciler, ResumeSubscription};
use crate::resume::ResumeWatch;

/// What a frame's edits turn into
#[derive(Debug, Clone, PartialEq)]
enum PanelAction {
    None,
    /// Only the diagnostics toggle changed; stays local
    ToggleDebug(bool),
    Push(Configuration),
}

fn plan(current: &Configuration, changes: &[ConfigChange]) -> PanelAction {
    if changes.is_empty() {
        return PanelAction::None;
    }
    let next = changes
        .iter()
        .fold(current.clone(), |config, change| config.with(*change));
    if next.differences(current).is_empty() {
        if next.show_debug != current.show_debug {
            return PanelAction::ToggleDebug(next.show_debug);
        }
        return PanelAction::None;
    }
    PanelAction::Push(next)
}

struct PanelApp {
    reconciler: Reconciler<SocketBridge>,
    _resume_subscription: Option<ResumeSubscription>,
    _resume_watch: Option<ResumeWatch>,
    // Dropped last; the guards above abort tasks running on it
    runtime: tokio::runtime::Runtime,
}

impl PanelApp {
    fn new(cc: &CreationContext<'_>, settings: &Settings) -> Result<Self> {
        info!("Initializing egui panel");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("panel-bridge")
            .enable_all()
            .build()
            .context("Failed to start tokio runtime")?;

        let socket = settings.socket_path();
        info!(socket = %socket.display(), "Using backend socket");
        let reconciler = Reconciler::new(SocketBridge::new(socket), settings.response_ordering);

        runtime.spawn({
            let reconciler = reconciler.clone();
            let ctx = cc.egui_ctx.clone();
            async move {
                reconciler.initialize().await;
                ctx.request_repaint();
            }
        });

        let (resume_watch, resume_subscription) = {
            let _enter = runtime.enter();
            match ResumeWatch::spawn(settings.resume_poll_interval(), settings.resume_gap_threshold()) {
                Ok((watch, events)) => (Some(watch), Some(reconciler.subscribe_resume(events))),
                Err(err) => {
                    error!(error = ?err, "Resume detection unavailable");
                    (None, None)
                }
            }
        };

        Ok(Self {
            reconciler,
            _resume_subscription: resume_subscription,
            _resume_watch: resume_watch,
            runtime,
        })
    }

    fn push(&self, config: Configuration, ctx: &egui::Context) {
        // Next frame diffs against the entered values, not the pre-edit snapshot
        self.reconciler.stage(&config);
        let reconciler = self.reconciler.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            reconciler.apply(config).await;
            ctx.request_repaint();
        });
    }

    fn reset(&self, ctx: &egui::Context) {
        let reconciler = self.reconciler.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            reconciler.reset().await;
            ctx.request_repaint();
        });
    }
}

impl eframe::App for PanelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let state = self.reconciler.snapshot();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(PADDING);
            ui.heading("RyzenAdj");
            ui.add_space(SECTION_SPACING);

            let config = match state.loaded() {
                Some(config) => config.clone(),
                None => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.colored_label(STATUS_PENDING, "Waiting for backend...");
                    });
                    return;
                }
            };

            let changes = tuning_controls::ui(ui, &config);
            match plan(&config, &changes) {
                PanelAction::None => {}
                PanelAction::ToggleDebug(show) => self.reconciler.set_show_debug(show),
                PanelAction::Push(next) => self.push(next, ctx),
            }

            ui.add_space(SECTION_SPACING);
            if ui.button("Reset All").clicked() {
                self.reset(ctx);
            }

            ui.add_space(SECTION_SPACING);
            ui.separator();
            ui.add_space(ITEM_SPACING);

            result_view::ui(ui, state.last_result.as_ref(), state.show_debug());
        });

        ctx.request_repaint_after(Duration::from_millis(REPAINT_INTERVAL_MS));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Panel exiting");
    }
}

pub fn run_panel(settings: Settings) -> Result<()> {
    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([WINDOW_WIDTH, WINDOW_HEIGHT])
            .with_min_inner_size([WINDOW_MIN_WIDTH, WINDOW_MIN_HEIGHT])
            .with_title("RyzenAdj"),
        ..Default::default()
    };

    eframe::run_native(
        "deck-ryzenadj",
        options,
        Box::new(move |cc| Ok(Box::new(PanelApp::new(cc, &settings)?))),
    )
    .map_err(|err| anyhow!("Failed to launch egui panel: {err}"))
}
