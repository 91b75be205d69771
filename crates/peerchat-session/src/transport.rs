//! Transport boundary: peer identities and ordered, reliable data channels.
//!
//! A [`Transport`] stands for the signaling layer. It knows our own peer id,
//! can open a channel to a remote id, and can accept an incoming one. The
//! controller never touches anything below this trait.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Frames buffered per direction before `send` waits for the reader.
pub const FRAME_BUFFER: usize = 64;

/// Opaque peer identity issued by the signaling layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Signaling layer used by a session.
pub trait Transport: Send + Sync {
    /// Identity assigned to this endpoint.
    fn local_id(&self) -> &PeerId;

    /// Open a channel to `remote`. Resolves once the remote side accepted.
    fn open(
        &self,
        remote: &PeerId,
    ) -> impl Future<Output = Result<Connection, TransportError>> + Send;

    /// Wait for the next incoming channel.
    fn listen(&self) -> impl Future<Output = Result<Connection, TransportError>> + Send;
}

/// One end of an ordered, reliable, bidirectional frame channel.
///
/// Dropping or closing either end makes the other end's [`recv`](Self::recv)
/// return `None` once buffered frames are drained.
#[derive(Debug)]
pub struct Connection {
    remote: PeerId,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    inbound: mpsc::Receiver<Vec<u8>>,
}

impl Connection {
    pub fn new(
        remote: PeerId,
        outbound: mpsc::Sender<Vec<u8>>,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            remote,
            outbound: Some(outbound),
            inbound,
        }
    }

    /// A connected pair: the first end is held by `a` and talks to `b`.
    pub fn pair(a: PeerId, b: PeerId) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(FRAME_BUFFER);
        let (b_tx, a_rx) = mpsc::channel(FRAME_BUFFER);
        (Self::new(b, a_tx, a_rx), Self::new(a, b_tx, b_rx))
    }

    pub const fn remote_id(&self) -> &PeerId {
        &self.remote
    }

    pub const fn is_open(&self) -> bool {
        self.outbound.is_some()
    }

    /// Send one frame.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Next frame from the remote, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Close both directions. Idempotent.
    pub fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_frames_in_order() {
        let (a, mut b) = Connection::pair("a".into(), "b".into());
        assert_eq!(a.remote_id().as_str(), "b");
        assert_eq!(b.remote_id().as_str(), "a");

        for i in 0..5u8 {
            a.send(vec![i]).await.unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(b.recv().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn closing_one_end_ends_the_other() {
        let (mut a, mut b) = Connection::pair("a".into(), "b".into());
        a.send(b"last".to_vec()).await.unwrap();
        a.close();
        a.close();

        assert!(!a.is_open());
        assert_eq!(b.recv().await.unwrap(), b"last");
        assert!(b.recv().await.is_none());
        assert_eq!(a.send(b"x".to_vec()).await, Err(TransportError::Closed));
        assert_eq!(b.send(b"x".to_vec()).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn dropping_an_end_closes_the_channel() {
        let (a, mut b) = Connection::pair("a".into(), "b".into());
        drop(a);
        assert!(b.recv().await.is_none());
    }
}
