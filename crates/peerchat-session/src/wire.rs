//! JSON envelopes exchanged over a connection.
//!
//! Two shapes share the channel:
//!
//! ```json
//! {"kind":"key","publicKeyRecord":{...}}
//! {"from":"<peer id>","kind":"text","timestamp":"2025-01-01T00:00:00.000Z","content":"..."}
//! ```
//!
//! The `kind` field tells them apart. Chat `content` is base64 ciphertext when
//! the session is encrypted and plaintext otherwise.

use peerchat_crypto::KeyRecord;
use peerchat_store::MessageKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `kind` tag of the public key frame.
pub const KEY_KIND: &str = "key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Key(KeyFrame),
    Chat(ChatFrame),
}

/// Carries one side's public key record during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFrame {
    kind: KeyTag,
    pub public_key_record: KeyRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KeyTag {
    Key,
}

/// A chat message as transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    pub from: String,
    pub kind: MessageKind,
    /// RFC 3339, millisecond precision, UTC.
    pub timestamp: String,
    pub content: String,
}

impl WireFrame {
    pub fn key(record: KeyRecord) -> Self {
        Self::Key(KeyFrame {
            kind: KeyTag::Key,
            public_key_record: record,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Key(frame) => serde_json::to_vec(frame),
            Self::Chat(frame) => serde_json::to_vec(frame),
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(raw)?;
        if value.get("kind").and_then(Value::as_str) == Some(KEY_KIND) {
            serde_json::from_value(value).map(Self::Key)
        } else {
            serde_json::from_value(value).map(Self::Chat)
        }
    }
}
