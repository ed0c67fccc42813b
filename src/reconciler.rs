//! Configuration reconciler
//!
//! Owns the local copy of the tuning configuration and turns user edits into
//! backend calls. The reconciler is cheap to clone; every clone shares the same
//! state, so the panel can hand a copy to each spawned request.
//!
//! Lifecycle: `Uninitialized -> Loading -> Ready`. The configuration stays
//! `None` until the initial fetch succeeds, and no update is ever pushed before
//! that. A failed fetch leaves the reconciler in `Loading` for good.
//!
//! Updates are not serialized against each other. With
//! [`ResponseOrdering::LastResolved`] the displayed result is whichever
//! response arrived last, even if an older request resolved after a newer one.
//! [`ResponseOrdering::LastIssued`] drops such stale responses instead.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Configuration, ResponseOrdering};
use crate::ipc::{Bridge, BridgeError, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Outcome of the most recent configuration push
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Success {
        applied: Configuration,
        /// False when the backend had nothing to change
        executed: bool,
        diagnostics: Option<Invocation>,
        received_at: DateTime<Local>,
    },
    Failure {
        message: String,
    },
}

impl OperationResult {
    pub fn failure(message: impl Into<String>) -> Self {
        OperationResult::Failure {
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }
}

/// Everything the panel needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilerState {
    pub phase: Phase,
    pub config: Option<Configuration>,
    pub last_result: Option<OperationResult>,
    last_result_seq: u64,
}

impl ReconcilerState {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Configuration to bind controls to; `None` while the initial fetch is outstanding
    pub fn loaded(&self) -> Option<&Configuration> {
        self.config.as_ref().filter(|_| self.is_ready())
    }

    pub fn show_debug(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.show_debug)
    }

    fn record(&mut self, seq: u64, result: OperationResult, ordering: ResponseOrdering) -> bool {
        if ordering == ResponseOrdering::LastIssued && seq < self.last_result_seq {
            return false;
        }
        if let OperationResult::Success { applied, .. } = &result {
            let show_debug = self.show_debug();
            self.config = Some(Configuration {
                show_debug,
                ..applied.clone()
            });
        }
        self.last_result = Some(result);
        self.last_result_seq = seq;
        true
    }
}

struct Inner<B> {
    bridge: B,
    ordering: ResponseOrdering,
    next_seq: AtomicU64,
    state: Mutex<ReconcilerState>,
}

pub struct Reconciler<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Reconciler<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Bridge> Reconciler<B> {
    pub fn new(bridge: B, ordering: ResponseOrdering) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                ordering,
                next_seq: AtomicU64::new(0),
                state: Mutex::new(ReconcilerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        // State is plain data, so a poisoned lock is still usable
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ReconcilerState {
        self.lock().clone()
    }

    #[cfg(test)]
    pub fn bridge(&self) -> &B {
        &self.inner.bridge
    }

    /// Fetch the active configuration once; later calls return the current state
    pub async fn initialize(&self) -> Option<Configuration> {
        {
            let mut state = self.lock();
            if state.phase != Phase::Uninitialized {
                return state.config.clone();
            }
            state.phase = Phase::Loading;
        }

        match self.inner.bridge.active_state().await {
            Ok(config) => {
                info!(?config, "Loaded active configuration");
                let mut state = self.lock();
                state.config = Some(config.clone());
                state.phase = Phase::Ready;
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read active configuration; staying in loading state");
                None
            }
        }
    }

    /// Push a complete configuration to the backend
    pub async fn apply(&self, config: Configuration) -> OperationResult {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock();
            if state.phase != Phase::Ready {
                debug!(seq, "Ignoring update before the initial fetch completed");
                return OperationResult::failure("configuration not loaded");
            }
            if let Err(e) = config.validate() {
                warn!(seq, error = %e, "Rejected invalid configuration");
                let result = OperationResult::failure(e.to_string());
                state.record(seq, result.clone(), self.inner.ordering);
                return result;
            }
            state.config = Some(config.clone());
        }

        debug!(seq, ?config, "Pushing configuration");
        let result = match self.inner.bridge.update_configuration(config).await {
            Ok(report) => OperationResult::Success {
                applied: report.applied,
                executed: report.executed,
                diagnostics: report.invocation,
                received_at: Local::now(),
            },
            Err(BridgeError::Backend(message)) => {
                warn!(seq, %message, "Backend rejected configuration");
                OperationResult::failure(message)
            }
            Err(e) => {
                warn!(seq, error = %e, "Configuration update failed");
                OperationResult::failure(e.to_string())
            }
        };

        let recorded = self.lock().record(seq, result.clone(), self.inner.ordering);
        if !recorded {
            debug!(seq, "Dropped stale response");
        }
        result
    }

    /// Show `config` immediately, ahead of the `apply` that will carry it
    ///
    /// Ignored before the initial fetch completed or when out of range.
    pub fn stage(&self, config: &Configuration) {
        let mut state = self.lock();
        if state.is_ready() && config.validate().is_ok() {
            state.config = Some(config.clone());
        }
    }

    /// Restore the default configuration and push it
    pub async fn reset(&self) -> OperationResult {
        info!("Resetting configuration to defaults");
        self.apply(Configuration::default()).await
    }

    /// Toggle diagnostic display; never reaches the backend
    pub fn set_show_debug(&self, show: bool) {
        if let Some(config) = self.lock().config.as_mut() {
            config.show_debug = show;
        }
    }

    /// Fire-and-forget resume notification
    pub fn notify_resume(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            info!("System resumed, notifying backend");
            if let Err(e) = this.inner.bridge.system_resumed().await {
                warn!(error = %e, "Resume notification failed");
            }
        })
    }

    /// Forward every resume event to [`Reconciler::notify_resume`] until the guard is dropped
    pub fn subscribe_resume(&self, mut events: mpsc::Receiver<()>) -> ResumeSubscription {
        let this = self.clone();
        let task = tokio::spawn(async move {
            while events.recv().await.is_some() {
                this.notify_resume();
            }
            debug!("Resume event source closed");
        });
        ResumeSubscription { task }
    }
}

/// Registration of the resume handler; dropping it deregisters
#[derive(Debug)]
pub struct ResumeSubscription {
    task: JoinHandle<()>,
}

impl Drop for ResumeSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
