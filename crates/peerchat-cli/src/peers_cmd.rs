//! Known peer subcommands.

use std::io::{self, Write};

use clap::Subcommand;
use peerchat_store::{MessageStore, PeerRecord, StoreError};

use crate::fmt::truncate;

#[derive(Subcommand, Debug)]
pub enum PeersAction {
    /// List known peers
    List,
    /// Add a peer
    Add {
        /// Peer ID as issued by signaling
        id: String,
        /// Display alias
        #[arg(short, long, default_value = "")]
        alias: String,
        /// Nickname
        #[arg(short, long, default_value = "")]
        nickname: String,
    },
    /// Change a peer's alias or nickname
    Edit {
        /// Peer ID
        id: String,
        #[arg(short, long)]
        alias: Option<String>,
        #[arg(short, long)]
        nickname: Option<String>,
    },
    /// Forget a peer
    Delete {
        /// Peer ID
        id: String,
    },
    /// Forget all peers
    Clear,
}

/// Execute a peers subcommand.
pub async fn run(store: &MessageStore, action: PeersAction) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        PeersAction::List => {
            let peers = store.list_peers().await?;
            if peers.is_empty() {
                writeln!(out, "No known peers.")?;
                return Ok(());
            }
            writeln!(out, "{:<36}  {:<16}  NICKNAME", "ID", "ALIAS")?;
            for p in &peers {
                writeln!(
                    out,
                    "{:<36}  {:<16}  {}",
                    p.id,
                    truncate(&p.alias, 16),
                    p.nickname
                )?;
            }
        }
        PeersAction::Add {
            id,
            alias,
            nickname,
        } => {
            let peer = PeerRecord {
                id,
                alias,
                nickname,
            };
            match store.add_peer(&peer).await {
                Ok(()) => writeln!(out, "Peer {} added.", peer.id)?,
                Err(StoreError::DuplicateKey(_)) => {
                    anyhow::bail!("peer {} already exists; use `peers edit`", peer.id)
                }
                Err(e) => return Err(e.into()),
            }
        }
        PeersAction::Edit {
            id,
            alias,
            nickname,
        } => {
            let mut peer = store.get_peer(&id).await?;
            if let Some(alias) = alias {
                peer.alias = alias;
            }
            if let Some(nickname) = nickname {
                peer.nickname = nickname;
            }
            store.update_peer(&peer).await?;
            writeln!(out, "Peer {id} updated.")?;
        }
        PeersAction::Delete { id } => {
            if store.delete_peer(&id).await? {
                writeln!(out, "Peer {id} deleted.")?;
            } else {
                writeln!(out, "Peer {id} not found.")?;
            }
        }
        PeersAction::Clear => {
            let removed = store.clear_peers().await?;
            writeln!(out, "Deleted {removed} peer(s).")?;
        }
    }
    Ok(())
}
