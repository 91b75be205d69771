//! `SQLite` storage for peerchat.
//!
//! Persists chat history (`messages`, auto-incrementing ids) and known peers
//! (`peers`, keyed by signaling identity). The schema is created by embedded
//! migrations on first open and tagged with a version.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::{MessageStore, SCHEMA_VERSION};
pub use models::{Direction, Message, MessageKind, PeerRecord, format_timestamp, parse_timestamp};
pub use peerchat_core::db::StoreError;
