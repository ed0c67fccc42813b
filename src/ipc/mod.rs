//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Provides message-based communication between the panel/CLI and the
//! backend daemon. Uses length-prefixed JSON over Unix domain sockets.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

mod bridge;
mod messages;
pub use bridge::{Bridge, BridgeError, SocketBridge};
pub use messages::{BackendRequest, BackendResponse, Invocation, UpdateReport};

use crate::constants::ipc::{CONNECT_TIMEOUT_MS, MAX_MESSAGE_SIZE};

/// Client connection to the backend daemon
pub struct BackendClient {
    stream: UnixStream,
}

impl BackendClient {
    /// Connect to a specific socket path
    pub async fn connect_to(path: &Path) -> Result<Self> {
        let stream = tokio::time::timeout(
            Duration::from_millis(CONNECT_TIMEOUT_MS),
            UnixStream::connect(path),
        )
        .await
        .map_err(|_| anyhow!("Timed out connecting to backend at {}", path.display()))?
        .with_context(|| format!("Failed to connect to backend at {}", path.display()))?;
        Ok(Self { stream })
    }

    /// Send request to the backend
    pub async fn send_request(&mut self, req: &BackendRequest) -> Result<()> {
        write_message(&mut self.stream, req).await
    }

    /// Receive response from the backend
    pub async fn recv_response(&mut self) -> Result<BackendResponse> {
        read_message(&mut self.stream).await
    }

    /// Send request and wait for response (convenience method)
    pub async fn request(&mut self, req: BackendRequest) -> Result<BackendResponse> {
        self.send_request(&req).await?;
        self.recv_response().await
    }
}

/// Server listener for the backend daemon
pub struct BackendServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl BackendServer {
    /// Create server and bind to a specific socket path
    pub fn bind_to(socket_path: PathBuf, mode: u32) -> Result<Self> {
        // Create directory if needed
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(mode))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    /// Get socket path
    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for BackendServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub(crate) async fn write_message<W, T>(stream: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", json.len(), MAX_MESSAGE_SIZE));
    }

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .await
        .context("Failed to write message length")?;

    stream
        .write_all(&json)
        .await
        .context("Failed to write message payload")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message; `None` when the peer closed the stream cleanly
pub(crate) async fn read_frame<R, T>(stream: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("Peer closed IPC stream");
            return Ok(None);
        }
        Err(e) => return Err(e).context("Failed to read message length"),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .await
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf)
        .map(Some)
        .context("Failed to deserialize message from JSON")
}

/// Read length-prefixed message, treating end of stream as an error
pub(crate) async fn read_message<R, T>(stream: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    read_frame(stream)
        .await?
        .ok_or_else(|| anyhow!("Connection closed before a message arrived"))
}
