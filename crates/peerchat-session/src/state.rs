//! Session lifecycle states and roles.

/// Lifecycle of a [`PeerSession`](crate::controller::PeerSession).
///
/// Variants are declared in lifecycle order, so `Ord` reflects progress.
/// `KeyExchanging` and `SecureReady` are skipped when encryption is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    KeyExchanging,
    SecureReady,
    ChatReady,
    Closed,
}

impl SessionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::KeyExchanging => "key_exchanging",
            Self::SecureReady => "secure_ready",
            Self::ChatReady => "chat_ready",
            Self::Closed => "closed",
        }
    }

    /// Whether a connection is open (any state from `Connected` up to `ChatReady`).
    pub fn is_established(self) -> bool {
        (Self::Connected..=Self::ChatReady).contains(&self)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side opened the connection.
///
/// The initiator always transmits its public key first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Responder => f.write_str("responder"),
        }
    }
}
