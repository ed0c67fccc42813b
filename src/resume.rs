//! Resume-from-suspend detection
//!
//! `CLOCK_BOOTTIME` keeps counting while the system sleeps and
//! `CLOCK_MONOTONIC` does not, so the gap between them grows by the length of
//! every suspend. Sampling that gap periodically is enough to notice a resume
//! without any desktop-specific D-Bus plumbing. SIGUSR1 is accepted as an
//! explicit trigger for suspend hooks.

use anyhow::{Context, Result};
use nix::time::{clock_gettime, ClockId};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Current `CLOCK_BOOTTIME - CLOCK_MONOTONIC`, i.e. total time spent suspended
pub fn suspended_time() -> Result<Duration> {
    let boot = clock_gettime(ClockId::CLOCK_BOOTTIME).context("Failed to read CLOCK_BOOTTIME")?;
    let mono = clock_gettime(ClockId::CLOCK_MONOTONIC).context("Failed to read CLOCK_MONOTONIC")?;
    let to_duration = |ts: nix::sys::time::TimeSpec| {
        Duration::new(ts.tv_sec().max(0) as u64, ts.tv_nsec().max(0) as u32)
    };
    Ok(to_duration(boot).saturating_sub(to_duration(mono)))
}

/// Turns successive suspended-time samples into resume events
#[derive(Debug, Clone)]
pub struct SuspendDetector {
    last: Duration,
    threshold: Duration,
}

impl SuspendDetector {
    pub fn new(initial: Duration, threshold: Duration) -> Self {
        Self {
            last: initial,
            threshold,
        }
    }

    /// Feed a new sample; true when it shows a suspend since the previous one
    pub fn observe(&mut self, sample: Duration) -> bool {
        let grown = sample.saturating_sub(self.last);
        self.last = sample;
        grown >= self.threshold
    }
}

/// Running resume event sources; dropping it stops them
pub struct ResumeWatch {
    clock_task: JoinHandle<()>,
    signal_handle: signal_hook::iterator::Handle,
}

impl ResumeWatch {
    /// Start the clock sampler and the SIGUSR1 listener; events arrive on the returned receiver
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(poll_interval: Duration, threshold: Duration) -> Result<(Self, mpsc::Receiver<()>)> {
        let (tx, rx) = mpsc::channel(8);

        let mut detector = SuspendDetector::new(suspended_time()?, threshold);
        let clock_tx = tx.clone();
        let clock_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sample = match suspended_time() {
                    Ok(sample) => sample,
                    Err(e) => {
                        error!(error = ?e, "Suspend detection stopped");
                        return;
                    }
                };
                if detector.observe(sample) {
                    info!(suspended = ?sample, "Detected resume from suspend");
                    if clock_tx.send(()).await.is_err() {
                        return;
                    }
                }
            }
        });

        let mut signals = signal_hook::iterator::Signals::new([signal_hook::consts::SIGUSR1])
            .context("Failed to register SIGUSR1 handler")?;
        let signal_handle = signals.handle();
        std::thread::spawn(move || {
            for _ in signals.forever() {
                info!("Received SIGUSR1, treating as resume");
                if tx.blocking_send(()).is_err() {
                    break;
                }
            }
            debug!("SIGUSR1 listener stopped");
        });

        Ok((
            Self {
                clock_task,
                signal_handle,
            },
            rx,
        ))
    }
}

impl Drop for ResumeWatch {
    fn drop(&mut self) {
        self.clock_task.abort();
        self.signal_handle.close();
    }
}
