//! Record types for the message store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use peerchat_core::db::StoreError;

/// Which side produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(Self::Outbound),
            "inbound" => Ok(Self::Inbound),
            other => Err(StoreError::Corrupt(format!("unknown direction {other:?}"))),
        }
    }
}

/// Payload tag of a chat message.
///
/// Only `text` has meaning to the core; other tags are carried through
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Text,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        if tag == "text" { Self::Text } else { Self::Other(tag) }
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => "text".to_string(),
            MessageKind::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message, sent or received. Content is always plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id; `None` until the message is persisted.
    pub id: Option<i64>,
    pub direction: Direction,
    /// Remote peer of the conversation.
    pub peer_id: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl Message {
    /// A message we are sending to `peer_id`, stamped now.
    pub fn outbound(peer_id: impl Into<String>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            direction: Direction::Outbound,
            peer_id: peer_id.into(),
            kind,
            timestamp: Utc::now(),
            content: content.into(),
        }
    }

    /// A message received from `peer_id` with the sender's timestamp.
    pub fn inbound(
        peer_id: impl Into<String>,
        kind: MessageKind,
        timestamp: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            direction: Direction::Inbound,
            peer_id: peer_id.into(),
            kind,
            timestamp,
            content: content.into(),
        }
    }

    /// Whether we authored this message.
    pub const fn is_mine(&self) -> bool {
        matches!(self.direction, Direction::Outbound)
    }
}

/// Render a timestamp the way it is stored and sent (RFC 3339, millis, `Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or received RFC 3339 timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Message row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: i64,
    pub direction: String,
    pub peer_id: String,
    pub kind: String,
    pub timestamp: String,
    pub content: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
            StoreError::Corrupt(format!("message {} has bad timestamp {:?}", row.id, row.timestamp))
        })?;
        Ok(Self {
            id: Some(row.id),
            direction: row.direction.parse()?,
            peer_id: row.peer_id,
            kind: MessageKind::from(row.kind),
            timestamp,
            content: row.content,
        })
    }
}

/// A peer we have connected to at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PeerRecord {
    /// Signaling-issued identity.
    pub id: String,
    pub alias: String,
    pub nickname: String,
}

impl PeerRecord {
    /// A record with empty alias and nickname.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: String::new(),
            nickname: String::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_roundtrips_through_strings() {
        assert_eq!(MessageKind::from("text"), MessageKind::Text);
        assert_eq!(
            MessageKind::from("image"),
            MessageKind::Other("image".to_string())
        );
        assert_eq!(String::from(MessageKind::Text), "text");
        assert_eq!(MessageKind::Other("file".into()).to_string(), "file");
    }

    #[test]
    fn direction_parses_known_values_only() {
        assert_eq!("outbound".parse::<Direction>().unwrap(), Direction::Outbound);
        assert_eq!("inbound".parse::<Direction>().unwrap(), Direction::Inbound);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn timestamp_format_is_iso8601_millis_utc() {
        let ts = parse_timestamp("2025-03-04T05:06:07.089Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2025-03-04T05:06:07.089Z");

        let offset = parse_timestamp("2025-03-04T14:06:07+09:00").unwrap();
        assert_eq!(format_timestamp(&offset), "2025-03-04T05:06:07.000Z");

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn row_with_bad_timestamp_is_corrupt() {
        let row = MessageRow {
            id: 1,
            direction: "inbound".into(),
            peer_id: "p".into(),
            kind: "text".into(),
            timestamp: "nope".into(),
            content: "hi".into(),
        };
        assert!(matches!(Message::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn outbound_message_is_mine() {
        let msg = Message::outbound("peer", MessageKind::Text, "hi");
        assert!(msg.is_mine());
        assert!(msg.id.is_none());
    }
}
