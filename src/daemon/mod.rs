//! Backend daemon - owns the active configuration and runs ryzenadj

mod backend;
mod ipc_handler;
pub mod ryzenadj;

pub use backend::Backend;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::{Settings, StateStore};
use crate::ipc::BackendServer;
use ryzenadj::{CommandRunner, ProcessRunner};

/// Run the daemon until SIGINT/SIGTERM or a Shutdown request
pub async fn run(settings: Settings) -> Result<()> {
    info!("Starting deck-ryzenadj backend");
    if !nix::unistd::geteuid().is_root() {
        warn!("Backend is not running as root; ryzenadj will most likely fail");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    spawn_signal_listener(shutdown_tx.clone())?;

    let server = BackendServer::bind_to(settings.socket_path(), settings.socket_mode)?;
    serve(server, &settings, ProcessRunner, shutdown_tx, shutdown_rx).await
}

/// Load saved state, apply it, then accept bridge connections
pub(crate) async fn serve<R: CommandRunner>(
    server: BackendServer,
    settings: &Settings,
    runner: R,
    shutdown_tx: mpsc::Sender<()>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let store = StateStore::new(settings.state_path());
    let initial = store
        .load()
        .inspect_err(|e| error!(error = ?e, "Ignoring unreadable daemon state"))
        .ok()
        .flatten()
        .unwrap_or_default();

    let mut backend = Backend::new(runner, settings.ryzenadj_path.clone(), Some(store), initial.clone());
    match backend.apply_full(initial).await {
        Ok(invocation) if invocation.succeeded() => info!(cmd = %invocation.command, "Applied initial configuration"),
        Ok(invocation) => warn!(
            returncode = invocation.returncode,
            stderr = %invocation.stderr.trim(),
            "Initial configuration was rejected by ryzenadj"
        ),
        Err(e) => error!(error = ?e, "Failed to apply initial configuration"),
    }
    let backend = Arc::new(Mutex::new(backend));

    info!(socket = ?server.path(), "IPC listener started");
    loop {
        tokio::select! {
            accepted = server.accept() => {
                let stream = match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = ?e, "IPC accept failed");
                        continue;
                    }
                };
                let backend = Arc::clone(&backend);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = ipc_handler::handle_connection(stream, backend, shutdown_tx).await {
                        warn!(error = ?e, "IPC connection closed with error");
                    }
                });
            }
            _ = shutdown_rx.recv() => {
                info!("Shutting down backend");
                break;
            }
        }
    }

    Ok(())
}

/// Forward SIGINT/SIGTERM to the shutdown channel from a dedicated thread
fn spawn_signal_listener(shutdown_tx: mpsc::Sender<()>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Received termination signal");
            shutdown_tx.blocking_send(()).ok();
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigChange, Configuration, ResponseOrdering};
    use crate::ipc::{Bridge, SocketBridge};
    use crate::reconciler::Reconciler;
    use backend::tests::FakeRunner;
    use std::path::PathBuf;

    struct Harness {
        _dir: tempfile::TempDir,
        socket: PathBuf,
        state: PathBuf,
        runner: FakeRunner,
        shutdown_tx: mpsc::Sender<()>,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start(saved: Option<Configuration>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("backend.sock");
        let state = dir.path().join("state.json");
        if let Some(config) = saved {
            StateStore::new(state.clone()).save(&config).unwrap();
        }
        let settings = Settings {
            socket_path: Some(socket.clone()),
            state_path: Some(state.clone()),
            ..Settings::default()
        };
        let runner = FakeRunner::default();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let server = BackendServer::bind_to(socket.clone(), 0o600).unwrap();
        let task = tokio::spawn({
            let runner = runner.clone();
            let shutdown_tx = shutdown_tx.clone();
            async move { serve(server, &settings, runner, shutdown_tx, shutdown_rx).await }
        });
        Harness {
            _dir: dir,
            socket,
            state,
            runner,
            shutdown_tx,
            task,
        }
    }

    #[tokio::test]
    async fn test_startup_applies_saved_configuration() {
        let saved = Configuration::default().with(ConfigChange::SetCpuOffset(-14));
        let harness = start(Some(saved.clone())).await;
        let bridge = SocketBridge::new(harness.socket.clone());

        assert_eq!(bridge.active_state().await.unwrap(), saved);
        assert_eq!(harness.runner.calls()[0], vec!["--set-coall=0xffff2".to_string()]);

        harness.shutdown_tx.send(()).await.unwrap();
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_startup_ignores_out_of_range_saved_state() {
        let saved = Configuration::default().with(ConfigChange::SetCpuOffset(-900));
        let harness = start(Some(saved)).await;
        let bridge = SocketBridge::new(harness.socket.clone());

        assert_eq!(bridge.active_state().await.unwrap(), Configuration::default());
        assert_eq!(harness.runner.calls()[0], vec!["--set-coall=0x100000".to_string()]);

        harness.shutdown_tx.send(()).await.unwrap();
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reconciler_round_trip_over_socket() {
        let harness = start(None).await;
        let reconciler = Reconciler::new(
            SocketBridge::new(harness.socket.clone()),
            ResponseOrdering::LastResolved,
        );

        let loaded = reconciler.initialize().await.unwrap();
        assert_eq!(loaded, Configuration::default());

        let wanted = loaded.with(ConfigChange::SetCpuOffset(-10));
        let result = reconciler.apply(wanted.clone()).await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(reconciler.snapshot().config, Some(wanted.clone()));
        assert_eq!(StateStore::new(harness.state.clone()).load().unwrap(), Some(wanted));

        reconciler.notify_resume().await.unwrap();
        reconciler.bridge().ping().await.unwrap();
        let calls = harness.runner.calls();
        assert_eq!(calls.last().unwrap(), &vec!["--set-coall=0xffff6".to_string()]);

        reconciler.bridge().shutdown().await.unwrap();
        harness.task.await.unwrap().unwrap();
        assert!(!harness.socket.exists());
    }

    #[tokio::test]
    async fn test_backend_failure_reaches_reconciler_verbatim() {
        let harness = start(None).await;
        harness.runner.fail_with(1);
        let reconciler = Reconciler::new(
            SocketBridge::new(harness.socket.clone()),
            ResponseOrdering::LastResolved,
        );
        reconciler.initialize().await.unwrap();

        let entered = Configuration::default().with(ConfigChange::SetCpuOffset(-7));
        let result = reconciler.apply(entered.clone()).await;

        assert_eq!(
            result,
            crate::reconciler::OperationResult::failure("ryzenadj exited with status 1: device busy")
        );
        assert_eq!(reconciler.snapshot().config, Some(entered));

        harness.shutdown_tx.send(()).await.unwrap();
        harness.task.await.unwrap().unwrap();
    }
}
