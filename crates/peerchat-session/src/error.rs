//! Session and transport error types.

use peerchat_crypto::CryptoError;
use peerchat_store::StoreError;

use crate::state::SessionState;

/// Errors reported by a [`Transport`](crate::transport::Transport) or
/// [`Connection`](crate::transport::Connection).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No peer with this identity is reachable through signaling.
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The requested local identity is already registered.
    #[error("Peer id already taken: {0}")]
    IdTaken(String),

    /// The signaling layer shut down.
    #[error("Signaling channel closed")]
    SignalingClosed,

    /// The data channel is closed.
    #[error("Connection closed")]
    Closed,
}

/// Errors from [`PeerSession`](crate::controller::PeerSession) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not open or accept a connection.
    #[error("Connection failed: {0}")]
    Connect(TransportError),

    #[error("Timed out waiting for the connection to open")]
    ConnectTimeout,

    #[error("Timed out waiting for the peer's public key")]
    HandshakeTimeout,

    #[error("Key exchange failed: {0}")]
    HandshakeFailed(String),

    /// The session was closed while the operation was waiting.
    #[error("Operation cancelled: session closed")]
    Cancelled,

    /// The operation is not valid in the current state.
    #[error("Not connected (session is {state})")]
    NotConnected { state: SessionState },

    /// A start operation was called on a session that already left `Idle`.
    #[error("Session already started (session is {state})")]
    AlreadyStarted { state: SessionState },

    /// The message kind collides with a protocol tag.
    #[error("Message kind {0:?} is reserved")]
    ReservedKind(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
