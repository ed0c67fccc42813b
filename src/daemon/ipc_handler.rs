//! Bridge request handler for the backend daemon

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::backend::Backend;
use super::ryzenadj::CommandRunner;
use crate::ipc::{read_frame, write_message, BackendRequest, BackendResponse};

/// Serve requests on one connection until the client hangs up
pub async fn handle_connection<R: CommandRunner>(
    mut stream: UnixStream,
    backend: Arc<Mutex<Backend<R>>>,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()> {
    debug!("Client connected to backend");

    while let Some(request) = read_frame::<_, BackendRequest>(&mut stream).await? {
        let response = dispatch(request, &backend, &shutdown_tx).await;
        write_message(&mut stream, &response)
            .await
            .context("Failed to send response")?;
    }

    debug!("Client disconnected from backend");
    Ok(())
}

pub(crate) async fn dispatch<R: CommandRunner>(
    request: BackendRequest,
    backend: &Mutex<Backend<R>>,
    shutdown_tx: &mpsc::Sender<()>,
) -> BackendResponse {
    match request {
        BackendRequest::ActiveState => {
            info!("request: active_state");
            let (first_update, state) = backend.lock().await.active_state();
            BackendResponse::ActiveState { first_update, state }
        }

        BackendRequest::UpdateConfiguration(config) => {
            info!("request: update_configuration");
            match backend.lock().await.update(config).await {
                Ok(report) => {
                    debug!(?report, "update_configuration response");
                    BackendResponse::Updated(report)
                }
                Err(e) => {
                    warn!(error = ?e, "Configuration update failed");
                    BackendResponse::Error(format!("{e:#}"))
                }
            }
        }

        BackendRequest::SystemResumed => {
            info!("request: system_resumed");
            // The caller does not wait on the outcome; failures are only logged
            match backend.lock().await.reapply().await {
                Ok(invocation) if !invocation.succeeded() => {
                    warn!(returncode = invocation.returncode, "Reapply after resume failed");
                }
                Ok(_) => {}
                Err(e) => error!(error = ?e, "Reapply after resume failed"),
            }
            BackendResponse::Ack
        }

        BackendRequest::Ping => BackendResponse::Pong,

        BackendRequest::Shutdown => {
            info!("Received shutdown request via IPC");
            shutdown_tx.send(()).await.ok();
            BackendResponse::Ack
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigChange, Configuration};
    use crate::daemon::backend::tests::FakeRunner;
    use std::path::PathBuf;

    fn shared(runner: &FakeRunner) -> Mutex<Backend<FakeRunner>> {
        Mutex::new(Backend::new(
            runner.clone(),
            PathBuf::from("ryzenadj"),
            None,
            Configuration::default(),
        ))
    }

    #[tokio::test]
    async fn test_active_state_reports_first_update() {
        let backend = shared(&FakeRunner::default());
        let (tx, _rx) = mpsc::channel(1);

        let first = dispatch(BackendRequest::ActiveState, &backend, &tx).await;
        let second = dispatch(BackendRequest::ActiveState, &backend, &tx).await;

        assert_eq!(
            first,
            BackendResponse::ActiveState {
                first_update: true,
                state: Configuration::default()
            }
        );
        assert!(matches!(second, BackendResponse::ActiveState { first_update: false, .. }));
    }

    #[tokio::test]
    async fn test_failed_update_becomes_error_response() {
        let runner = FakeRunner::default();
        runner.fail_with(1);
        let backend = shared(&runner);
        let (tx, _rx) = mpsc::channel(1);

        let response = dispatch(
            BackendRequest::UpdateConfiguration(
                Configuration::default().with(ConfigChange::SetCpuOffset(-3)),
            ),
            &backend,
            &tx,
        )
        .await;

        assert_eq!(
            response,
            BackendResponse::Error("ryzenadj exited with status 1: device busy".to_string())
        );
    }

    #[tokio::test]
    async fn test_out_of_range_update_never_reaches_ryzenadj() {
        let runner = FakeRunner::default();
        let backend = shared(&runner);
        let (tx, _rx) = mpsc::channel(1);

        let response = dispatch(
            BackendRequest::UpdateConfiguration(Configuration {
                cpu_offset: -2_000_000,
                apply_power_limit: true,
                power_limit_mw: 4_000_000_000,
                ..Configuration::default()
            }),
            &backend,
            &tx,
        )
        .await;

        assert_eq!(
            response,
            BackendResponse::Error(
                "Rejected configuration: CPU offset -2000000 outside -30..=0".to_string()
            )
        );
        assert!(runner.calls().is_empty());
        assert_eq!(backend.lock().await.active(), &Configuration::default());
    }

    #[tokio::test]
    async fn test_system_resumed_reapplies_and_acks() {
        let runner = FakeRunner::default();
        let backend = shared(&runner);
        let (tx, _rx) = mpsc::channel(1);

        let response = dispatch(BackendRequest::SystemResumed, &backend, &tx).await;

        assert_eq!(response, BackendResponse::Ack);
        assert_eq!(runner.calls(), vec![vec!["--set-coall=0x100000".to_string()]]);
    }

    #[tokio::test]
    async fn test_shutdown_signals_main_loop() {
        let backend = shared(&FakeRunner::default());
        let (tx, mut rx) = mpsc::channel(1);

        let response = dispatch(BackendRequest::Shutdown, &backend, &tx).await;

        assert_eq!(response, BackendResponse::Ack);
        assert_eq!(rx.recv().await, Some(()));
    }
}
