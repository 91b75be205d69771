//! Peer session controller.
//!
//! A [`PeerSession`] drives one conversation through its lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Connected -> KeyExchanging -> SecureReady -> ChatReady -> Closed
//!                                 \________________________________/
//!                                        (encryption disabled)
//! ```
//!
//! Every suspension point (connect, accept, handshake, receive) observes the
//! session's cancellation token, so [`PeerSession::close`] or a
//! [`SessionCloser`] interrupts whatever is pending.

use std::collections::VecDeque;

use peerchat_core::config::{ChatOptions, Config, SessionTimeouts};
use peerchat_crypto::{KeyExchangeState, KeyRecord, SessionKeys};
use peerchat_store::{
    Message, MessageKind, MessageStore, PeerRecord, StoreError, format_timestamp, parse_timestamp,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::event::{DropReason, SessionEvent};
use crate::state::{Role, SessionState};
use crate::transport::{Connection, PeerId, Transport};
use crate::wire::{ChatFrame, KEY_KIND, WireFrame};

/// Options and time limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub options: ChatOptions,
    pub timeouts: SessionTimeouts,
}

impl SessionConfig {
    fn validate(&self) -> Result<(), SessionError> {
        if self.timeouts.connect_timeout_secs == 0 {
            return Err(SessionError::Config("connect timeout must be > 0".into()));
        }
        if self.timeouts.handshake_timeout_secs == 0 {
            return Err(SessionError::Config("handshake timeout must be > 0".into()));
        }
        Ok(())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            options: config.options,
            timeouts: config.session,
        }
    }
}

/// Closes a session from another task.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    token: CancellationToken,
}

impl SessionCloser {
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One chat session with one remote peer.
pub struct PeerSession<T: Transport> {
    transport: T,
    options: ChatOptions,
    timeouts: SessionTimeouts,
    store: Option<MessageStore>,
    state: SessionState,
    role: Option<Role>,
    remote: Option<PeerId>,
    connection: Option<Connection>,
    keys: Option<SessionKeys>,
    /// Peer key that arrived before we started negotiating.
    pending_key: Option<KeyRecord>,
    /// Chat frames held until the session is chat-ready, in arrival order.
    backlog: VecDeque<Vec<u8>>,
    /// Events produced but not yet handed to the caller.
    outbox: VecDeque<SessionEvent>,
    transcript: Vec<Message>,
    cancel: CancellationToken,
}

impl<T: Transport> PeerSession<T> {
    /// Create an idle session.
    ///
    /// Saving messages requires a store.
    pub fn new(
        transport: T,
        config: SessionConfig,
        store: Option<MessageStore>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if config.options.save_messages && store.is_none() {
            return Err(SessionError::Config(
                "message saving is enabled but no store is attached".into(),
            ));
        }

        Ok(Self {
            transport,
            options: config.options,
            timeouts: config.timeouts,
            store,
            state: SessionState::Idle,
            role: None,
            remote: None,
            connection: None,
            keys: None,
            pending_key: None,
            backlog: VecDeque::new(),
            outbox: VecDeque::new(),
            transcript: Vec::new(),
            cancel: CancellationToken::new(),
        })
    }

    // =========================================================================
    // Connection setup
    // =========================================================================

    /// Open a connection to `remote`.
    pub async fn start_as_initiator(&mut self, remote: &PeerId) -> Result<(), SessionError> {
        self.begin_connect()?;
        info!(local = %self.transport.local_id(), remote = %remote, "Connecting to peer");

        let limit = self.timeouts.connect_timeout();
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            opened = tokio::time::timeout(limit, self.transport.open(remote)) => match opened {
                Ok(Ok(conn)) => Ok(conn),
                Ok(Err(e)) => Err(SessionError::Connect(e)),
                Err(_) => Err(SessionError::ConnectTimeout),
            },
        };

        let conn = self.finish_connect(outcome)?;
        self.on_connected(conn, Role::Initiator).await;
        Ok(())
    }

    /// Wait for an incoming connection. Returns the remote peer's id.
    pub async fn start_as_responder(&mut self) -> Result<PeerId, SessionError> {
        self.begin_connect()?;
        info!(local = %self.transport.local_id(), "Waiting for incoming connection");

        let limit = self.timeouts.connect_timeout();
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            accepted = tokio::time::timeout(limit, self.transport.listen()) => match accepted {
                Ok(Ok(conn)) => Ok(conn),
                Ok(Err(e)) => Err(SessionError::Connect(e)),
                Err(_) => Err(SessionError::ConnectTimeout),
            },
        };

        let conn = self.finish_connect(outcome)?;
        let remote = conn.remote_id().clone();
        self.on_connected(conn, Role::Responder).await;
        Ok(remote)
    }

    fn begin_connect(&mut self) -> Result<(), SessionError> {
        self.sync_cancel();
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted { state: self.state });
        }
        self.transition(SessionState::Connecting);
        Ok(())
    }

    /// A transport error leaves the session `Idle` so the caller may retry;
    /// timeouts and cancellation close it.
    fn finish_connect(
        &mut self,
        outcome: Result<Connection, SessionError>,
    ) -> Result<Connection, SessionError> {
        outcome.inspect_err(|e| {
            warn!(error = %e, "Connection attempt failed");
            if matches!(e, SessionError::Connect(_)) {
                self.transition(SessionState::Idle);
            } else {
                self.shutdown();
            }
        })
    }

    async fn on_connected(&mut self, conn: Connection, role: Role) {
        let remote = conn.remote_id().clone();
        self.connection = Some(conn);
        self.role = Some(role);
        self.remote = Some(remote.clone());
        self.transition(SessionState::Connected);
        info!(remote = %remote, role = %role, "Peer connected");

        self.remember_peer(&remote).await;
    }

    /// Record the remote in the peers collection the first time we see it.
    async fn remember_peer(&mut self, remote: &PeerId) {
        let Some(store) = &self.store else {
            return;
        };
        match store.add_peer(&PeerRecord::new(remote.as_str())).await {
            Ok(()) => debug!(peer = %remote, "Recorded new peer"),
            Err(StoreError::DuplicateKey(_)) => {}
            Err(e) => {
                warn!(peer = %remote, error = %e, "Failed to record peer");
                self.outbox.push_back(SessionEvent::StoreFailed(e));
            }
        }
    }

    // =========================================================================
    // Key exchange
    // =========================================================================

    /// Move a connected session to `ChatReady`, exchanging keys first when
    /// `enabled`.
    ///
    /// Both sides must use the same setting. The initiator sends its public
    /// key first; the responder replies once it has the initiator's key.
    pub async fn negotiate_encryption(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.sync_cancel();
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected { state: self.state });
        }

        if enabled {
            self.transition(SessionState::KeyExchanging);
            match self.run_key_exchange().await {
                Ok(keys) => {
                    info!(
                        local_fingerprint = %keys.local_thumbprint(),
                        peer_fingerprint = %keys.peer_thumbprint(),
                        "Key exchange complete"
                    );
                    self.keys = Some(keys);
                    self.transition(SessionState::SecureReady);
                }
                Err(e) => {
                    warn!(error = %e, "Key exchange failed");
                    self.shutdown();
                    return Err(e);
                }
            }
        } else {
            info!("Encryption disabled, messages travel in plaintext");
            if self.pending_key.take().is_some() {
                warn!("Peer sent a public key but encryption is disabled here");
                self.outbox
                    .push_back(SessionEvent::Dropped(DropReason::UnexpectedKey));
            }
        }

        self.transition(SessionState::ChatReady);
        self.replay_backlog().await;
        Ok(())
    }

    async fn run_key_exchange(&mut self) -> Result<SessionKeys, SessionError> {
        let limit = self.timeouts.handshake_timeout();
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            exchanged = tokio::time::timeout(limit, self.exchange_keys()) => {
                exchanged.unwrap_or(Err(SessionError::HandshakeTimeout))
            }
        }
    }

    async fn exchange_keys(&mut self) -> Result<SessionKeys, SessionError> {
        // RSA key generation is CPU-bound.
        let local = tokio::task::spawn_blocking(KeyExchangeState::new)
            .await
            .map_err(|e| SessionError::HandshakeFailed(format!("key generation task failed: {e}")))??;
        debug!(fingerprint = %local.thumbprint(), "Generated session key pair");
        let ours = WireFrame::key(local.public_record());

        if self.role == Some(Role::Initiator) {
            self.send_key(&ours).await?;
            let peer = self.await_peer_key().await?;
            Ok(local.complete(&peer)?)
        } else {
            let peer = self.await_peer_key().await?;
            let keys = local.complete(&peer)?;
            self.send_key(&ours).await?;
            Ok(keys)
        }
    }

    async fn send_key(&mut self, frame: &WireFrame) -> Result<(), SessionError> {
        self.send_frame(frame).await.map_err(|e| match e {
            SessionError::Transport(cause) => {
                SessionError::HandshakeFailed(format!("could not send public key: {cause}"))
            }
            other => other,
        })
    }

    async fn await_peer_key(&mut self) -> Result<KeyRecord, SessionError> {
        if let Some(record) = self.pending_key.take() {
            return Ok(record);
        }

        loop {
            let state = self.state;
            let conn = self
                .connection
                .as_mut()
                .ok_or(SessionError::NotConnected { state })?;
            let Some(raw) = conn.recv().await else {
                return Err(SessionError::HandshakeFailed(
                    "connection closed before the peer's key arrived".into(),
                ));
            };

            match WireFrame::decode(&raw) {
                Ok(WireFrame::Key(frame)) => return Ok(frame.public_key_record),
                Ok(WireFrame::Chat(_)) => {
                    debug!("Holding chat frame until the handshake completes");
                    self.backlog.push_back(raw);
                }
                Err(e) => {
                    warn!(error = %e, "Dropping malformed frame during key exchange");
                    self.outbox
                        .push_back(SessionEvent::Dropped(DropReason::Malformed));
                }
            }
        }
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Send a chat message and append it to the transcript.
    ///
    /// Encrypted sessions reject content over the codec's plaintext limit
    /// with `PayloadTooLarge`; nothing is transmitted in that case.
    pub async fn send(
        &mut self,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, SessionError> {
        self.sync_cancel();
        if self.state != SessionState::ChatReady {
            return Err(SessionError::NotConnected { state: self.state });
        }
        if kind.as_str() == KEY_KIND {
            return Err(SessionError::ReservedKind(kind.to_string()));
        }

        let payload = match &self.keys {
            Some(keys) => keys.encrypt(content)?,
            None => content.to_owned(),
        };
        let remote = self.remote.as_ref().map(ToString::to_string).unwrap_or_default();
        let mut message = Message::outbound(remote, kind, content);
        let frame = WireFrame::Chat(ChatFrame {
            from: self.transport.local_id().to_string(),
            kind: message.kind.clone(),
            timestamp: format_timestamp(&message.timestamp),
            content: payload,
        });
        self.send_frame(&frame).await?;
        debug!(kind = %message.kind, encrypted = self.keys.is_some(), "Sent message");

        let stored = self.persist(&mut message).await;
        self.transcript.push(message.clone());
        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist sent message");
            self.outbox.push_back(SessionEvent::StoreFailed(e));
        }
        Ok(message)
    }

    /// Feed one raw frame into the session.
    ///
    /// Frames that arrive before the session is chat-ready are held and
    /// replayed in order once it is. Resulting events are queued for
    /// [`next_event`](Self::next_event).
    pub async fn on_receive(&mut self, raw: &[u8]) -> Result<(), SessionError> {
        self.sync_cancel();
        match self.state {
            SessionState::Connected | SessionState::KeyExchanging | SessionState::SecureReady => {
                self.hold(raw);
            }
            SessionState::ChatReady => self.handle_frame(raw).await,
            state => return Err(SessionError::NotConnected { state }),
        }
        Ok(())
    }

    /// Next notification, waiting on the connection if none is queued.
    ///
    /// After [`SessionEvent::Closed`] has been returned, further calls fail
    /// with `NotConnected`.
    pub async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        loop {
            if let Some(event) = self.outbox.pop_front() {
                return Ok(event);
            }
            self.sync_cancel();
            if !self.outbox.is_empty() {
                continue;
            }

            let state = self.state;
            if !state.is_established() {
                return Err(SessionError::NotConnected { state });
            }
            let cancel = self.cancel.clone();
            let conn = self
                .connection
                .as_mut()
                .ok_or(SessionError::NotConnected { state })?;
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                frame = conn.recv() => Some(frame),
            };

            match received {
                None => self.shutdown(),
                Some(None) => {
                    info!(remote = ?self.remote, "Peer closed the connection");
                    self.shutdown();
                }
                Some(Some(raw)) => self.on_receive(&raw).await?,
            }
        }
    }

    fn hold(&mut self, raw: &[u8]) {
        match WireFrame::decode(raw) {
            Ok(WireFrame::Key(frame)) if self.pending_key.is_none() => {
                self.pending_key = Some(frame.public_key_record);
            }
            Ok(WireFrame::Key(_)) => {
                warn!("Dropping repeated key frame");
                self.outbox
                    .push_back(SessionEvent::Dropped(DropReason::UnexpectedKey));
            }
            Ok(WireFrame::Chat(_)) => self.backlog.push_back(raw.to_vec()),
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                self.outbox
                    .push_back(SessionEvent::Dropped(DropReason::Malformed));
            }
        }
    }

    async fn replay_backlog(&mut self) {
        while let Some(raw) = self.backlog.pop_front() {
            self.handle_frame(&raw).await;
        }
    }

    async fn handle_frame(&mut self, raw: &[u8]) {
        let frame = match WireFrame::decode(raw) {
            Ok(WireFrame::Chat(frame)) => frame,
            Ok(WireFrame::Key(_)) => {
                warn!(remote = ?self.remote, "Dropping key frame outside the handshake");
                self.outbox
                    .push_back(SessionEvent::Dropped(DropReason::UnexpectedKey));
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                self.outbox
                    .push_back(SessionEvent::Dropped(DropReason::Malformed));
                return;
            }
        };

        let content = match &self.keys {
            Some(keys) => match keys.decrypt(&frame.content) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!(remote = ?self.remote, error = %e, "Dropping message that could not be decrypted");
                    self.outbox
                        .push_back(SessionEvent::Dropped(DropReason::Undecryptable));
                    return;
                }
            },
            None => frame.content,
        };
        let Some(timestamp) = parse_timestamp(&frame.timestamp) else {
            warn!(timestamp = %frame.timestamp, "Dropping message with invalid timestamp");
            self.outbox
                .push_back(SessionEvent::Dropped(DropReason::Malformed));
            return;
        };

        let remote = self
            .remote
            .as_ref()
            .map_or_else(|| frame.from.clone(), ToString::to_string);
        if frame.from != remote {
            debug!(claimed = %frame.from, remote = %remote, "Sender id differs from connection peer");
        }

        let mut message = Message::inbound(remote, frame.kind, timestamp, content);
        let stored = self.persist(&mut message).await;
        self.transcript.push(message.clone());
        self.outbox.push_back(SessionEvent::Message(message));
        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist received message");
            self.outbox.push_back(SessionEvent::StoreFailed(e));
        }
    }

    async fn send_frame(&mut self, frame: &WireFrame) -> Result<(), SessionError> {
        let raw = frame.encode()?;
        let state = self.state;
        let conn = self
            .connection
            .as_ref()
            .ok_or(SessionError::NotConnected { state })?;
        let sent = conn.send(raw).await;
        if let Err(e) = sent {
            warn!(error = %e, "Transport failure while sending");
            self.shutdown();
            return Err(SessionError::Transport(e));
        }
        Ok(())
    }

    async fn persist(&self, message: &mut Message) -> Result<(), StoreError> {
        if !self.options.save_messages {
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };
        let id = store.add_message(message).await?;
        message.id = Some(id);
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close the session. Idempotent; interrupts any pending operation.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!(remote = ?self.remote, "Closing session");
        }
        self.cancel.cancel();
        self.shutdown();
    }

    /// Handle for closing this session from elsewhere.
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            token: self.cancel.clone(),
        }
    }

    fn sync_cancel(&mut self) {
        if self.cancel.is_cancelled() {
            self.shutdown();
        }
    }

    fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut conn) = self.connection.take() {
            conn.close();
        }
        self.keys = None;
        self.pending_key = None;
        self.backlog.clear();
        self.transition(SessionState::Closed);
        self.outbox.push_back(SessionEvent::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_initiator(&self) -> bool {
        self.role == Some(Role::Initiator)
    }

    pub fn is_responder(&self) -> bool {
        self.role == Some(Role::Responder)
    }

    pub fn local_id(&self) -> &PeerId {
        self.transport.local_id()
    }

    pub const fn remote_id(&self) -> Option<&PeerId> {
        self.remote.as_ref()
    }

    pub const fn options(&self) -> ChatOptions {
        self.options
    }

    /// Whether chat payloads are encrypted.
    pub const fn is_secure(&self) -> bool {
        self.keys.is_some()
    }

    /// Thumbprint of our session public key, once exchanged.
    pub fn local_fingerprint(&self) -> Option<&str> {
        self.keys.as_ref().map(SessionKeys::local_thumbprint)
    }

    /// Thumbprint of the peer's session public key, once exchanged.
    pub fn peer_fingerprint(&self) -> Option<&str> {
        self.keys.as_ref().map(SessionKeys::peer_thumbprint)
    }

    /// Messages sent and received so far, in order.
    pub fn messages(&self) -> &[Message] {
        &self.transcript
    }

    pub const fn store(&self) -> Option<&MessageStore> {
        self.store.as_ref()
    }

    /// Replace the transcript with the store's saved history.
    pub async fn load_history(&mut self) -> Result<usize, SessionError> {
        let store = self.store.as_ref().ok_or_else(|| {
            SessionError::Store(StoreError::Unavailable("no message store attached".into()))
        })?;
        let history = store.list_messages().await?;
        self.transcript = history;
        Ok(self.transcript.len())
    }
}

impl<T: Transport> std::fmt::Debug for PeerSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("local", self.transport.local_id())
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("secure", &self.keys.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::local::LocalSignal;

    fn idle_session() -> PeerSession<crate::local::LocalTransport> {
        let signal = LocalSignal::new();
        PeerSession::new(signal.register(), SessionConfig::default(), None).unwrap()
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let signal = LocalSignal::new();
        let mut config = SessionConfig::default();
        config.timeouts.handshake_timeout_secs = 0;

        let err = PeerSession::new(signal.register(), config, None).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn saving_without_store_is_rejected() {
        let signal = LocalSignal::new();
        let mut config = SessionConfig::default();
        config.options.save_messages = true;

        let err = PeerSession::new(signal.register(), config, None).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn config_conversion_copies_options_and_timeouts() {
        let mut config = Config::default();
        config.options.encryption_enabled = false;
        config.session.connect_timeout_secs = 3;

        let session = SessionConfig::from(&config);
        assert!(!session.options.encryption_enabled);
        assert_eq!(session.timeouts.connect_timeout_secs, 3);
    }

    #[tokio::test]
    async fn new_session_is_idle() {
        let session = idle_session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.role().is_none());
        assert!(session.remote_id().is_none());
        assert!(!session.is_secure());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn close_from_idle_emits_closed_once() {
        let mut session = idle_session();
        session.close();
        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.next_event().await.unwrap(),
            SessionEvent::Closed
        ));
        assert!(matches!(
            session.next_event().await,
            Err(SessionError::NotConnected {
                state: SessionState::Closed
            })
        ));
    }

    #[tokio::test]
    async fn closer_takes_effect_on_next_operation() {
        let mut session = idle_session();
        let closer = session.closer();
        closer.close();
        assert!(closer.is_closed());

        let err = session.start_as_initiator(&PeerId::from("B")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::AlreadyStarted {
                state: SessionState::Closed
            }
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn operations_before_connect_are_rejected() {
        let mut session = idle_session();

        assert!(matches!(
            session.negotiate_encryption(true).await,
            Err(SessionError::NotConnected {
                state: SessionState::Idle
            })
        ));
        assert!(matches!(
            session.on_receive(b"{}").await,
            Err(SessionError::NotConnected {
                state: SessionState::Idle
            })
        ));
        assert!(matches!(
            session.next_event().await,
            Err(SessionError::NotConnected {
                state: SessionState::Idle
            })
        ));
    }

    #[tokio::test]
    async fn load_history_without_store_fails() {
        let mut session = idle_session();
        assert!(matches!(
            session.load_history().await,
            Err(SessionError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_peer_fails_to_connect_and_stays_idle() {
        let mut session = idle_session();
        let err = session
            .start_as_initiator(&PeerId::from("nobody"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Connect(_)));
        assert_eq!(session.state(), SessionState::Idle);

        // Still usable: a second attempt is accepted by the state machine.
        let again = session.start_as_initiator(&PeerId::from("nobody")).await;
        assert!(matches!(again, Err(SessionError::Connect(_))));
    }
}
