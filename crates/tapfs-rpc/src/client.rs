//! Dialing client for the session RPC.

use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use tapfs_proto::{read_message, write_message, Method, TraceRequest, TraceResponse, WireError};

/// Client-side RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Dial or socket failure.
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),

    /// Framing or encoding failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The server answered with an in-band error.
    #[error("server error: {0}")]
    Remote(String),
}

/// A connection to the session server.
pub struct RpcClient {
    stream: UnixStream,
}

impl RpcClient {
    /// Connects to the server socket.
    pub fn dial(socket: &Path) -> Result<Self, RpcError> {
        debug!(socket = %socket.display(), "dialing session server");
        Ok(Self {
            stream: UnixStream::connect(socket)?,
        })
    }

    /// Issues one call and waits for its response. In-band server errors
    /// surface as [`RpcError::Remote`].
    pub fn call(&mut self, method: Method, pgid: i32) -> Result<TraceResponse, RpcError> {
        write_message(&mut self.stream, &TraceRequest { method, pgid })?;
        let response: TraceResponse = read_message(&mut self.stream)?;
        if let Some(message) = response.err {
            return Err(RpcError::Remote(message));
        }
        Ok(response)
    }
}
