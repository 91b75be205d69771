//! Notifications surfaced by a session, in arrival order.

use peerchat_store::{Message, StoreError};

/// Why an inbound frame produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Ciphertext did not decrypt under our private key.
    Undecryptable,
    /// Frame was not a valid envelope.
    Malformed,
    /// A key frame arrived outside the handshake.
    UnexpectedKey,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undecryptable => f.write_str("undecryptable"),
            Self::Malformed => f.write_str("malformed"),
            Self::UnexpectedKey => f.write_str("unexpected key"),
        }
    }
}

#[derive(Debug)]
pub enum SessionEvent {
    /// A chat message was received and appended to the transcript.
    Message(Message),
    /// An inbound frame was discarded; the session stays open.
    Dropped(DropReason),
    /// Persisting a message failed; the message was still delivered.
    StoreFailed(StoreError),
    /// The session reached `Closed`. Emitted exactly once.
    Closed,
}
