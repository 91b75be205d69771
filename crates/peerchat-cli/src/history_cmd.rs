//! Saved message history subcommands.

use std::io::{self, Write};

use clap::Subcommand;
use peerchat_store::{MessageStore, format_timestamp};

use crate::fmt::{short_id, truncate};

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List saved messages, oldest first
    List {
        /// Show only the most recent N messages
        #[arg(short = 'n', long)]
        last: Option<usize>,
    },
    /// Delete one saved message
    Delete {
        /// Message ID
        id: i64,
    },
    /// Delete all saved messages
    Clear,
}

/// Execute a history subcommand.
pub async fn run(store: &MessageStore, action: HistoryAction) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        HistoryAction::List { last } => {
            let mut messages = store.list_messages().await?;
            if let Some(n) = last {
                let skip = messages.len().saturating_sub(n);
                messages.drain(..skip);
            }
            if messages.is_empty() {
                writeln!(out, "No saved messages.")?;
                return Ok(());
            }

            writeln!(
                out,
                "{:>6}  {:<24}  {:<3}  {:<8}  {:<8}  CONTENT",
                "ID", "TIMESTAMP", "DIR", "PEER", "KIND"
            )?;
            for m in &messages {
                writeln!(
                    out,
                    "{:>6}  {:<24}  {:<3}  {:<8}  {:<8}  {}",
                    m.id.unwrap_or_default(),
                    format_timestamp(&m.timestamp),
                    if m.is_mine() { "out" } else { "in" },
                    short_id(&m.peer_id),
                    truncate(m.kind.as_str(), 8),
                    truncate(&m.content, 50),
                )?;
            }
        }
        HistoryAction::Delete { id } => {
            if store.delete_message(id).await? {
                writeln!(out, "Message {id} deleted.")?;
            } else {
                writeln!(out, "Message {id} not found.")?;
            }
        }
        HistoryAction::Clear => {
            let removed = store.clear_messages().await?;
            writeln!(out, "Deleted {removed} message(s).")?;
        }
    }
    Ok(())
}
