//! The backend operations the reconciler depends on, and the socket-backed
//! implementation used by the panel and CLI.

use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use super::{BackendClient, BackendRequest, BackendResponse, UpdateReport};
use crate::config::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Failure reported by the backend itself, shown to the user verbatim
    #[error("{0}")]
    Backend(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

/// Remote operations exposed by the backend
pub trait Bridge: Send + Sync + 'static {
    /// Read the active configuration
    fn active_state(&self) -> impl Future<Output = Result<Configuration, BridgeError>> + Send;

    /// Push a complete configuration
    fn update_configuration(
        &self,
        config: Configuration,
    ) -> impl Future<Output = Result<UpdateReport, BridgeError>> + Send;

    /// Tell the backend the system resumed from suspend
    fn system_resumed(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Bridge over the daemon's Unix socket, one connection per request
#[derive(Debug, Clone)]
pub struct SocketBridge {
    path: PathBuf,
}

impl SocketBridge {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn call(&self, req: BackendRequest) -> Result<BackendResponse, BridgeError> {
        let mut client = BackendClient::connect_to(&self.path)
            .await
            .map_err(|e| BridgeError::Transport(format!("{e:#}")))?;
        let resp = client
            .request(req)
            .await
            .map_err(|e| BridgeError::Transport(format!("{e:#}")))?;
        debug!(response = ?resp, "Backend responded");
        match resp {
            BackendResponse::Error(message) => Err(BridgeError::Backend(message)),
            other => Ok(other),
        }
    }

    pub async fn ping(&self) -> Result<(), BridgeError> {
        match self.call(BackendRequest::Ping).await? {
            BackendResponse::Pong => Ok(()),
            other => Err(BridgeError::Protocol(format!("{other:?}"))),
        }
    }

    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        match self.call(BackendRequest::Shutdown).await? {
            BackendResponse::Ack => Ok(()),
            other => Err(BridgeError::Protocol(format!("{other:?}"))),
        }
    }
}

impl Bridge for SocketBridge {
    fn active_state(&self) -> impl Future<Output = Result<Configuration, BridgeError>> + Send {
        async move {
            match self.call(BackendRequest::ActiveState).await? {
                BackendResponse::ActiveState { first_update, state } => {
                    debug!(first_update, "Received active state");
                    Ok(state)
                }
                other => Err(BridgeError::Protocol(format!("{other:?}"))),
            }
        }
    }

    fn update_configuration(
        &self,
        config: Configuration,
    ) -> impl Future<Output = Result<UpdateReport, BridgeError>> + Send {
        async move {
            match self.call(BackendRequest::UpdateConfiguration(config)).await? {
                BackendResponse::Updated(report) => Ok(report),
                other => Err(BridgeError::Protocol(format!("{other:?}"))),
            }
        }
    }

    fn system_resumed(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        async move {
            match self.call(BackendRequest::SystemResumed).await? {
                BackendResponse::Ack => Ok(()),
                other => Err(BridgeError::Protocol(format!("{other:?}"))),
            }
        }
    }
}
