//! Errors surfaced by the tunnel session and its public handle.

use thiserror::Error;

use knxnet_proto::ProtocolError;

/// Errors a [`crate::Tunnel`] or one of its internal actors can raise.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The calling context was cancelled (external cancellation, or `close()`).
    #[error("operation cancelled")]
    Cancelled,

    /// No response arrived within the configured deadline.
    #[error("timed out waiting for a response")]
    Timeout,

    /// The socket's inbound stream ended; the transport is dead.
    #[error("inbound socket stream closed")]
    InboundClosed,

    /// The gateway denied CONNECT_REQUEST with a non-OK, non-BUSY status.
    #[error("gateway rejected connection request (status {status})")]
    ConnectRejected { status: u8 },

    /// A received frame violated a session invariant (channel mismatch,
    /// out-of-window sequence, undecodable bytes). The offending frame is
    /// dropped; the session is not torn down for this alone.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The gateway acked our tunnel request with a non-zero status.
    #[error("gateway rejected tunnel request (status {status})")]
    TunnelRejected { status: u8 },

    /// A heartbeat probe timed out or returned a non-Normal status.
    #[error("heartbeat failed")]
    HeartbeatFailed,

    /// The gateway sent DISCONNECT_REQUEST and the subsequent reconnect
    /// attempt did not succeed.
    #[error("session disconnected")]
    Disconnected,

    /// Underlying UDP socket I/O failure.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for TunnelError {
    fn from(err: ProtocolError) -> Self {
        TunnelError::ProtocolViolation(err.to_string())
    }
}
