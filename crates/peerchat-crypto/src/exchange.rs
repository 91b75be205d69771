//! Key exchange protocol logic.
//!
//! Each side generates a key pair per session, sends the exported public
//! record to its peer, and completes the exchange by importing the peer's
//! record as its encoder. The private key never leaves the
//! [`KeyExchangeState`] / [`SessionKeys`] that owns it.

use crate::codec;
use crate::error::CryptoError;
use crate::keys::{DecryptKey, EncryptKey, KeyPair, KeyRecord, export_public_key};

/// State of a key exchange in progress.
#[derive(Debug)]
pub struct KeyExchangeState {
    local: KeyPair,
}

impl KeyExchangeState {
    /// Start a new key exchange by generating a fresh key pair.
    pub fn new() -> Result<Self, CryptoError> {
        Ok(Self {
            local: KeyPair::generate()?,
        })
    }

    /// Start a key exchange from an existing key pair (e.g. restored from backup).
    pub const fn with_key_pair(local: KeyPair) -> Self {
        Self { local }
    }

    /// Our public key record to send to the peer.
    pub fn public_record(&self) -> KeyRecord {
        export_public_key(self.local.public_key())
    }

    /// Thumbprint of our public key.
    pub fn thumbprint(&self) -> String {
        self.local.thumbprint()
    }

    /// Complete the exchange with the peer's public key record.
    pub fn complete(self, peer_record: &KeyRecord) -> Result<SessionKeys, CryptoError> {
        if peer_record.is_private() {
            return Err(CryptoError::InvalidKeyRecord(
                "peer sent private key material".to_string(),
            ));
        }
        let encoder = EncryptKey::from_record(peer_record)?;
        let local_thumbprint = self.local.thumbprint();
        let (_, decoder) = self.local.into_parts();

        Ok(SessionKeys {
            encoder,
            decoder,
            local_thumbprint,
            peer_thumbprint: peer_record.thumbprint(),
        })
    }
}

/// Key handles agreed for one chat session.
///
/// Immutable once built; a new exchange produces a new value.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    /// Peer's public key, used for outbound messages.
    encoder: EncryptKey,
    /// Our private key, used for inbound messages.
    decoder: DecryptKey,
    local_thumbprint: String,
    peer_thumbprint: String,
}

impl SessionKeys {
    /// Encrypt an outbound message for the peer.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        codec::encrypt(plaintext, &self.encoder)
    }

    /// Decrypt an inbound message from the peer.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        codec::decrypt(ciphertext, &self.decoder)
    }

    pub const fn encoder(&self) -> &EncryptKey {
        &self.encoder
    }

    pub const fn decoder(&self) -> &DecryptKey {
        &self.decoder
    }

    pub fn local_thumbprint(&self) -> &str {
        &self.local_thumbprint
    }

    pub fn peer_thumbprint(&self) -> &str {
        &self.peer_thumbprint
    }
}

/// Perform a complete key exchange and return matching keys for both sides.
///
/// Mainly useful for testing. In production each side creates a
/// `KeyExchangeState`, sends its public record, and calls `complete()` with
/// the peer's record.
#[cfg(any(test, feature = "test-utils"))]
pub fn perform_key_exchange() -> Result<(SessionKeys, SessionKeys), CryptoError> {
    let a = KeyExchangeState::new()?;
    let b = KeyExchangeState::new()?;

    let a_pub = a.public_record();
    let b_pub = b.public_record();

    Ok((a.complete(&b_pub)?, b.complete(&a_pub)?))
}
