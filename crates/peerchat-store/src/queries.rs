//! Database queries for the message store.
//!
//! Each method is a single statement and therefore its own transaction.

use peerchat_core::db::StoreError;

use super::db::MessageStore;
use super::models::{Message, MessageRow, PeerRecord, format_timestamp};

impl MessageStore {
    // =========================================================================
    // Message queries
    // =========================================================================

    /// Persist a message and return its newly assigned id.
    ///
    /// Any id already set on `message` is ignored.
    pub async fn add_message(&self, message: &Message) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO messages (direction, peer_id, kind, timestamp, content)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(message.direction.as_str())
        .bind(&message.peer_id)
        .bind(message.kind.as_str())
        .bind(format_timestamp(&message.timestamp))
        .bind(&message.content)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All messages in insertion order.
    pub async fn list_messages(&self) -> Result<Vec<Message>, StoreError> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, direction, peer_id, kind, timestamp, content FROM messages ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    /// Delete one message. Returns whether it existed.
    pub async fn delete_message(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every message. Returns how many were removed.
    pub async fn clear_messages(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages")
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Peer queries
    // =========================================================================

    /// Insert a peer record; fails with `DuplicateKey` if the id is known.
    pub async fn add_peer(&self, peer: &PeerRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO peers (id, alias, nickname) VALUES (?, ?, ?)")
            .bind(&peer.id)
            .bind(&peer.alias)
            .bind(&peer.nickname)
            .execute(self.pool())
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::DuplicateKey(_) => StoreError::DuplicateKey(format!("Peer {}", peer.id)),
                other => other,
            })?;

        Ok(())
    }

    /// Get a peer by id.
    pub async fn get_peer(&self, id: &str) -> Result<PeerRecord, StoreError> {
        sqlx::query_as::<_, PeerRecord>("SELECT id, alias, nickname FROM peers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Peer {id}")))
    }

    /// Overwrite alias and nickname of an existing peer.
    pub async fn update_peer(&self, peer: &PeerRecord) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE peers SET alias = ?, nickname = ? WHERE id = ?")
            .bind(&peer.alias)
            .bind(&peer.nickname)
            .bind(&peer.id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Peer {}", peer.id)));
        }
        Ok(())
    }

    /// All peers in the order they were first recorded.
    pub async fn list_peers(&self) -> Result<Vec<PeerRecord>, StoreError> {
        let peers = sqlx::query_as::<_, PeerRecord>(
            "SELECT id, alias, nickname FROM peers ORDER BY rowid",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(peers)
    }

    /// Delete one peer. Returns whether it existed.
    pub async fn delete_peer(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM peers WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every peer. Returns how many were removed.
    pub async fn clear_peers(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM peers").execute(self.pool()).await?;

        Ok(result.rows_affected())
    }
}
