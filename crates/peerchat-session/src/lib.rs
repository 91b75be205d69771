//! peerchat session layer.
//!
//! Connects two peers over a [`Transport`], optionally exchanges RSA session
//! keys, and routes chat messages between the wire, the caller and the
//! message store.

pub mod controller;
pub mod error;
pub mod event;
pub mod local;
pub mod state;
pub mod transport;
pub mod wire;

pub use controller::{PeerSession, SessionCloser, SessionConfig};
pub use error::{SessionError, TransportError};
pub use event::{DropReason, SessionEvent};
pub use local::{LocalSignal, LocalTransport};
pub use state::{Role, SessionState};
pub use transport::{Connection, PeerId, Transport};
