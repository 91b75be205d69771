//! Message payload encryption.
//!
//! Text is encoded as UTF-8, encrypted with RSA-OAEP (SHA-256) under the
//! peer's public key and carried as standard base64. A single OAEP block is
//! the unit of encryption, so plaintexts are bounded by
//! [`MAX_PLAINTEXT_LEN`]; longer input is rejected rather than split.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::{DecryptKey, EncryptKey, MODULUS_BITS};

/// SHA-256 output size.
const HASH_LEN: usize = 32;

/// Largest plaintext, in bytes, that fits one OAEP block: k - 2*hLen - 2.
pub const MAX_PLAINTEXT_LEN: usize = MODULUS_BITS / 8 - 2 * HASH_LEN - 2;

/// Encrypt `plaintext` under `key`, returning base64 ciphertext.
pub fn encrypt(plaintext: &str, key: &EncryptKey) -> Result<String, CryptoError> {
    let bytes = plaintext.as_bytes();
    if bytes.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PayloadTooLarge {
            len: bytes.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }

    let ciphertext = key
        .as_rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), bytes)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt base64 ciphertext produced by [`encrypt`].
///
/// Every failure collapses into [`CryptoError::DecryptionFailed`].
pub fn decrypt(ciphertext: &str, key: &DecryptKey) -> Result<String, CryptoError> {
    let raw = STANDARD
        .decode(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let plaintext = key
        .as_rsa()
        .decrypt(Oaep::new::<Sha256>(), &raw)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        CryptoError::DecryptionFailed
    })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::keys::{EncryptKey, export_public_key, test_key_pair};

    #[test]
    fn max_plaintext_len_is_190() {
        assert_eq!(MAX_PLAINTEXT_LEN, 190);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let kp = test_key_pair();
        let ciphertext = encrypt("hello", kp.public_key()).unwrap();

        assert_ne!(ciphertext, "hello");
        assert_eq!(decrypt(&ciphertext, kp.private_key()).unwrap(), "hello");
    }

    #[test]
    fn roundtrip_at_size_boundaries() {
        let kp = test_key_pair();
        for text in [
            String::new(),
            "x".to_string(),
            "a".repeat(MAX_PLAINTEXT_LEN),
            // 63 three-byte chars = 189 bytes
            "\u{3042}".repeat(63),
        ] {
            let ciphertext = encrypt(&text, kp.public_key()).unwrap();
            assert_eq!(decrypt(&ciphertext, kp.private_key()).unwrap(), text);
        }
    }

    #[test]
    fn oversized_plaintext_is_rejected() {
        let kp = test_key_pair();
        let result = encrypt(&"a".repeat(500), kp.public_key());
        assert!(matches!(
            result,
            Err(CryptoError::PayloadTooLarge { len: 500, max: 190 })
        ));

        // The limit is in bytes, not chars.
        let result = encrypt(&"\u{3042}".repeat(64), kp.public_key());
        assert!(matches!(result, Err(CryptoError::PayloadTooLarge { len: 192, .. })));
    }

    #[test]
    fn ciphertext_is_randomized() {
        let kp = test_key_pair();
        let a = encrypt("same", kp.public_key()).unwrap();
        let b = encrypt("same", kp.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn imported_public_key_encrypts_for_original_pair() {
        let kp = test_key_pair();
        let imported = EncryptKey::from_record(&export_public_key(kp.public_key())).unwrap();

        let ciphertext = encrypt("over the wire", &imported).unwrap();
        assert_eq!(decrypt(&ciphertext, kp.private_key()).unwrap(), "over the wire");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let kp = test_key_pair();
        let other = test_key_pair();

        let ciphertext = encrypt("secret", kp.public_key()).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, other.private_key()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn decrypt_failures_are_undifferentiated() {
        let kp = test_key_pair();
        let ciphertext = encrypt("secret", kp.public_key()).unwrap();

        let mut tampered = STANDARD.decode(&ciphertext).unwrap();
        tampered[10] ^= 0xFF;
        let tampered = STANDARD.encode(tampered);

        let errors = [
            decrypt("not base64 at all!", kp.private_key()).unwrap_err(),
            decrypt(&tampered, kp.private_key()).unwrap_err(),
            decrypt("", kp.private_key()).unwrap_err(),
            decrypt(&STANDARD.encode([1u8; 16]), kp.private_key()).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, CryptoError::DecryptionFailed));
            assert_eq!(err.to_string(), "Message could not be read");
        }
    }

    #[test]
    fn concurrent_use_is_safe() {
        use std::sync::Arc;
        use std::thread;

        let kp = Arc::new(test_key_pair());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let kp = Arc::clone(&kp);
                thread::spawn(move || {
                    let text = format!("message {i}");
                    let ciphertext = encrypt(&text, kp.public_key()).unwrap();
                    assert_eq!(decrypt(&ciphertext, kp.private_key()).unwrap(), text);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
