//! In-process signaling hub.
//!
//! [`LocalSignal`] is a broker that hands out peer ids and routes connection
//! offers between [`LocalTransport`] endpoints living in the same process.
//! It backs the demo command and the integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Connection, PeerId, Transport};

/// Pending offers per endpoint.
const OFFER_BUFFER: usize = 8;

struct Offer {
    connection: Connection,
    accepted: oneshot::Sender<()>,
}

type Registry = HashMap<PeerId, mpsc::Sender<Offer>>;

/// Shared signaling broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalSignal {
    peers: Arc<Mutex<Registry>>,
}

impl LocalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under a freshly generated id.
    pub fn register(&self) -> LocalTransport {
        let id = PeerId::new(uuid::Uuid::new_v4().to_string());
        let offers = self.insert(id.clone());
        LocalTransport::new(id, self.clone(), offers)
    }

    /// Register an endpoint under a chosen id.
    pub fn register_as(&self, id: impl Into<PeerId>) -> Result<LocalTransport, TransportError> {
        let id = id.into();
        if self.registry().contains_key(&id) {
            return Err(TransportError::IdTaken(id.to_string()));
        }
        let offers = self.insert(id.clone());
        Ok(LocalTransport::new(id, self.clone(), offers))
    }

    /// Ids of all registered endpoints.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.registry().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn insert(&self, id: PeerId) -> mpsc::Receiver<Offer> {
        let (tx, rx) = mpsc::channel(OFFER_BUFFER);
        self.registry().insert(id, tx);
        rx
    }

    fn lookup(&self, id: &PeerId) -> Option<mpsc::Sender<Offer>> {
        self.registry().get(id).cloned()
    }

    fn remove(&self, id: &PeerId) {
        self.registry().remove(id);
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LocalSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSignal")
            .field("peers", &self.registry().len())
            .finish()
    }
}

/// An endpoint registered with a [`LocalSignal`]. Deregisters on drop.
pub struct LocalTransport {
    id: PeerId,
    signal: LocalSignal,
    offers: tokio::sync::Mutex<mpsc::Receiver<Offer>>,
}

impl LocalTransport {
    fn new(id: PeerId, signal: LocalSignal, offers: mpsc::Receiver<Offer>) -> Self {
        Self {
            id,
            signal,
            offers: tokio::sync::Mutex::new(offers),
        }
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.signal.remove(&self.id);
    }
}

impl Transport for LocalTransport {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    async fn open(&self, remote: &PeerId) -> Result<Connection, TransportError> {
        let unavailable = || TransportError::PeerUnavailable(remote.to_string());
        let offers = self.signal.lookup(remote).ok_or_else(unavailable)?;

        let (ours, theirs) = Connection::pair(self.id.clone(), remote.clone());
        let (accepted_tx, accepted_rx) = oneshot::channel();
        offers
            .send(Offer {
                connection: theirs,
                accepted: accepted_tx,
            })
            .await
            .map_err(|_| unavailable())?;

        accepted_rx.await.map_err(|_| unavailable())?;
        debug!(local = %self.id, remote = %remote, "Connection accepted");
        Ok(ours)
    }

    async fn listen(&self) -> Result<Connection, TransportError> {
        let mut offers = self.offers.lock().await;
        loop {
            let offer = offers.recv().await.ok_or(TransportError::SignalingClosed)?;
            // The opener may have given up while the offer was queued.
            if offer.accepted.send(()).is_ok() {
                debug!(local = %self.id, remote = %offer.connection.remote_id(), "Accepted connection");
                return Ok(offer.connection);
            }
            debug!(local = %self.id, "Skipping abandoned connection offer");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_and_listen_connect_both_ends() {
        let signal = LocalSignal::new();
        let a = signal.register();
        let b = signal.register_as("B").unwrap();

        let (opened, accepted) = tokio::join!(a.open(b.local_id()), b.listen());
        let opened = opened.unwrap();
        let mut accepted = accepted.unwrap();

        assert_eq!(opened.remote_id(), b.local_id());
        assert_eq!(accepted.remote_id(), a.local_id());

        opened.send(b"hi".to_vec()).await.unwrap();
        assert_eq!(accepted.recv().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn unknown_peer_is_unavailable() {
        let signal = LocalSignal::new();
        let a = signal.register();

        let err = a.open(&PeerId::from("nobody")).await.unwrap_err();
        assert_eq!(err, TransportError::PeerUnavailable("nobody".into()));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let signal = LocalSignal::new();
        let _b = signal.register_as("B").unwrap();
        assert_eq!(
            signal.register_as("B").unwrap_err(),
            TransportError::IdTaken("B".into())
        );
    }

    #[tokio::test]
    async fn dropped_endpoint_deregisters() {
        let signal = LocalSignal::new();
        let b = signal.register_as("B").unwrap();
        assert_eq!(signal.peers(), vec![PeerId::from("B")]);

        drop(b);
        assert!(signal.peers().is_empty());
        assert!(signal.register_as("B").is_ok());
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let signal = LocalSignal::new();
        let a = signal.register();
        let b = signal.register();
        assert_ne!(a.local_id(), b.local_id());
    }

    #[tokio::test]
    async fn abandoned_offer_is_skipped() {
        let signal = LocalSignal::new();
        let a = signal.register_as("A").unwrap();
        let c = signal.register_as("C").unwrap();
        let b = signal.register_as("B").unwrap();

        // A gives up before B listens; its offer stays queued.
        let gave_up = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            a.open(b.local_id()),
        )
        .await;
        assert!(gave_up.is_err());

        let (opened, accepted) = tokio::join!(c.open(b.local_id()), b.listen());
        opened.unwrap();
        assert_eq!(accepted.unwrap().remote_id().as_str(), "C");
    }
}
