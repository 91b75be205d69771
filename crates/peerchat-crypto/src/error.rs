//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Invalid key record: {0}")]
    InvalidKeyRecord(String),

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Deliberately carries no detail: callers must not be able to tell a
    /// padding failure from a wrong key or a corrupt encoding.
    #[error("Message could not be read")]
    DecryptionFailed,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
