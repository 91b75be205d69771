//! peerchat E2E Encryption Library
//!
//! Provides the key exchange and message codec used between two chat peers,
//! with the signaling service unable to read message content.
//!
//! ## Crypto primitives
//!
//! - **Keys**: RSA 2048, exponent 65537, fresh pair per session
//! - **Exchange**: public keys travel as JWK-shaped records
//! - **Encryption**: RSA-OAEP with SHA-256, one block per message (max 190 bytes)

pub mod codec;
pub mod error;
pub mod exchange;
pub mod keys;

pub use codec::{MAX_PLAINTEXT_LEN, decrypt, encrypt};
pub use error::CryptoError;
#[cfg(any(test, feature = "test-utils"))]
pub use exchange::perform_key_exchange;
pub use exchange::{KeyExchangeState, SessionKeys};
#[cfg(any(test, feature = "test-utils"))]
pub use keys::test_key_pair;
pub use keys::{
    DecryptKey, EncryptKey, KeyHandle, KeyPair, KeyRecord, KeyUsage, export_private_key,
    export_public_key, import_key,
};
