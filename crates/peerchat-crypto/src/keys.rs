//! Asymmetric key lifecycle.
//!
//! Every session generates a fresh RSA-OAEP key pair (2048-bit modulus,
//! exponent 65537, SHA-256). Keys live in memory as usage-tagged handles:
//! an [`EncryptKey`] can only encrypt and a [`DecryptKey`] can only decrypt.
//! Neither handle implements `Serialize`; crossing a process boundary always
//! goes through an explicit export into a [`KeyRecord`], and only
//! [`export_public_key`] output is ever meant for the wire.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Modulus size of every key in the profile.
pub const MODULUS_BITS: usize = 2048;

/// Public exponent of every key in the profile.
pub const PUBLIC_EXPONENT: u64 = 65_537;

/// `alg` value of exported records (RSA-OAEP with SHA-256).
pub const KEY_ALGORITHM: &str = "RSA-OAEP-256";

/// `kty` value of exported records.
pub const KEY_TYPE: &str = "RSA";

/// What a key handle is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encrypt => f.write_str("encrypt"),
            Self::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Portable, JWK-shaped key record.
///
/// Big integers are unsigned big-endian, base64url without padding. The
/// private fields are only present in records produced by
/// [`export_private_key`] and are wiped from memory when the record drops.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    #[zeroize(skip)]
    pub alg: String,
    #[zeroize(skip)]
    pub kty: String,
    #[zeroize(skip)]
    pub n: String,
    #[zeroize(skip)]
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default)]
    #[zeroize(skip)]
    pub key_ops: Vec<KeyUsage>,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("alg", &self.alg)
            .field("kty", &self.kty)
            .field("thumbprint", &self.thumbprint())
            .field("private", &self.is_private())
            .field("key_ops", &self.key_ops)
            .finish()
    }
}

impl KeyRecord {
    /// Whether the record carries private key material.
    pub const fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// RFC 7638 thumbprint (SHA-256, base64url) of the public part.
    ///
    /// Stable across export/import, so both peers compute the same value
    /// for the same key.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"e":"{}","kty":"{}","n":"{}"}}"#,
            self.e, self.kty, self.n
        );
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Public key handle, restricted to encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptKey {
    inner: RsaPublicKey,
}

impl std::fmt::Debug for EncryptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptKey")
            .field("thumbprint", &export_public_key(self).thumbprint())
            .finish()
    }
}

impl EncryptKey {
    /// Import a record as an encrypt-only handle.
    pub fn from_record(record: &KeyRecord) -> Result<Self, CryptoError> {
        check_profile(record, KeyUsage::Encrypt)?;
        let inner = public_from_record(record)?;
        Ok(Self { inner })
    }

    pub(crate) const fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

/// Private key handle, restricted to decryption.
#[derive(Clone)]
pub struct DecryptKey {
    inner: RsaPrivateKey,
}

impl std::fmt::Debug for DecryptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptKey")
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl DecryptKey {
    /// Import a private record as a decrypt-only handle.
    pub fn from_record(record: &KeyRecord) -> Result<Self, CryptoError> {
        check_profile(record, KeyUsage::Decrypt)?;
        let public = public_from_record(record)?;

        let (Some(d), Some(p), Some(q)) = (&record.d, &record.p, &record.q) else {
            return Err(CryptoError::InvalidKeyRecord(
                "record has no private key material".to_string(),
            ));
        };
        let d = decode_uint("d", d)?;
        let p = decode_uint("p", p)?;
        let q = decode_uint("q", q)?;

        let inner =
            RsaPrivateKey::from_components(public.n().clone(), public.e().clone(), d, vec![p, q])
                .map_err(|e| CryptoError::InvalidKeyRecord(e.to_string()))?;
        Ok(Self { inner })
    }

    /// The matching encrypt-only handle.
    pub fn public_key(&self) -> EncryptKey {
        EncryptKey {
            inner: self.inner.to_public_key(),
        }
    }

    pub(crate) const fn as_rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

/// Either kind of imported handle.
#[derive(Debug, Clone)]
pub enum KeyHandle {
    Encrypt(EncryptKey),
    Decrypt(DecryptKey),
}

/// A locally generated key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    public: EncryptKey,
    private: DecryptKey,
}

impl KeyPair {
    /// Generate a fresh key pair from OS randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new_with_exp(
            &mut OsRng,
            MODULUS_BITS,
            &BigUint::from(PUBLIC_EXPONENT),
        )
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Ok(Self::from_private(DecryptKey { inner: private }))
    }

    /// Rebuild a pair from its private half.
    pub fn from_private(private: DecryptKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub const fn public_key(&self) -> &EncryptKey {
        &self.public
    }

    pub const fn private_key(&self) -> &DecryptKey {
        &self.private
    }

    /// Split into the two handles.
    pub fn into_parts(self) -> (EncryptKey, DecryptKey) {
        (self.public, self.private)
    }

    /// Thumbprint of the public half.
    pub fn thumbprint(&self) -> String {
        export_public_key(&self.public).thumbprint()
    }

    /// Back up the private key as a JSON record with owner-only permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let record = export_private_key(&self.private);
        let mut json = serde_json::to_vec_pretty(&record)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        let written = write_owner_only(path, &json);
        json.zeroize();
        written.map_err(CryptoError::from)
    }

    /// Restore a key pair from a backup written by [`KeyPair::save_to_file`].
    ///
    /// On Unix, refuses files readable by anyone but the owner.
    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
            if mode != 0o600 {
                return Err(CryptoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("Key backup has insecure permissions: {mode:o} (expected 600)"),
                )));
            }
        }

        let mut data = std::fs::read(path)?;
        let parsed = serde_json::from_slice::<KeyRecord>(&data);
        data.zeroize();
        let record = parsed.map_err(|e| CryptoError::InvalidKeyRecord(e.to_string()))?;
        Ok(Self::from_private(DecryptKey::from_record(&record)?))
    }
}

/// Write `data` to `path`, never letting it be readable by others.
///
/// New files are created as 0600; an existing file is narrowed to 0600
/// before it is truncated and overwritten.
fn write_owner_only(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.set_len(0)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Export a public key handle. This is the only record that may cross the wire.
pub fn export_public_key(key: &EncryptKey) -> KeyRecord {
    KeyRecord {
        alg: KEY_ALGORITHM.to_string(),
        kty: KEY_TYPE.to_string(),
        n: encode_uint(key.inner.n()),
        e: encode_uint(key.inner.e()),
        d: None,
        p: None,
        q: None,
        key_ops: vec![KeyUsage::Encrypt],
    }
}

/// Export a private key handle for local backup/restore.
pub fn export_private_key(key: &DecryptKey) -> KeyRecord {
    let primes = key.inner.primes();
    KeyRecord {
        alg: KEY_ALGORITHM.to_string(),
        kty: KEY_TYPE.to_string(),
        n: encode_uint(key.inner.n()),
        e: encode_uint(key.inner.e()),
        d: Some(encode_uint(key.inner.d())),
        p: primes.first().map(encode_uint),
        q: primes.get(1).map(encode_uint),
        key_ops: vec![KeyUsage::Decrypt],
    }
}

/// Import a record as a handle restricted to `usage`.
pub fn import_key(record: &KeyRecord, usage: KeyUsage) -> Result<KeyHandle, CryptoError> {
    match usage {
        KeyUsage::Encrypt => EncryptKey::from_record(record).map(KeyHandle::Encrypt),
        KeyUsage::Decrypt => DecryptKey::from_record(record).map(KeyHandle::Decrypt),
    }
}

fn check_profile(record: &KeyRecord, usage: KeyUsage) -> Result<(), CryptoError> {
    if record.kty != KEY_TYPE {
        return Err(CryptoError::InvalidKeyRecord(format!(
            "unsupported key type {:?}",
            record.kty
        )));
    }
    if record.alg != KEY_ALGORITHM {
        return Err(CryptoError::InvalidKeyRecord(format!(
            "unsupported algorithm {:?}",
            record.alg
        )));
    }
    if !record.key_ops.is_empty() && !record.key_ops.contains(&usage) {
        return Err(CryptoError::InvalidKeyRecord(format!(
            "record does not permit {usage}"
        )));
    }
    Ok(())
}

fn public_from_record(record: &KeyRecord) -> Result<RsaPublicKey, CryptoError> {
    let n = decode_uint("n", &record.n)?;
    let e = decode_uint("e", &record.e)?;
    if e != BigUint::from(PUBLIC_EXPONENT) {
        return Err(CryptoError::InvalidKeyRecord(
            "unexpected public exponent".to_string(),
        ));
    }
    let key = RsaPublicKey::new(n, e).map_err(|e| CryptoError::InvalidKeyRecord(e.to_string()))?;
    if key.size() * 8 != MODULUS_BITS {
        return Err(CryptoError::InvalidKeyRecord(format!(
            "modulus is {} bits, expected {MODULUS_BITS}",
            key.size() * 8
        )));
    }
    Ok(key)
}

fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

fn decode_uint(field: &str, value: &str) -> Result<BigUint, CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| CryptoError::InvalidKeyRecord(format!("field {field}: {e}")))?;
    if bytes.is_empty() {
        return Err(CryptoError::InvalidKeyRecord(format!("field {field} is empty")));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Generate a key pair for tests.
#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub fn test_key_pair() -> KeyPair {
    KeyPair::generate().expect("key generation")
}
