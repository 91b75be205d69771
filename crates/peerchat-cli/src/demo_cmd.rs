//! In-process demo: two peers connect over a local signaling hub and chat.

use std::io::{self, Write};

use anyhow::Context;
use clap::Args;
use peerchat_core::{ChatOptions, Config};
use peerchat_session::{LocalSignal, LocalTransport, PeerSession, SessionConfig, SessionEvent};
use peerchat_store::{Message, MessageKind, MessageStore};
use tracing::warn;

use crate::fmt::short_id;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Messages the initiator sends, in order
    #[arg(default_values_t = [String::from("hello")])]
    pub messages: Vec<String>,

    /// Skip the key exchange and chat in plaintext
    #[arg(long)]
    pub plaintext: bool,

    /// Save the initiator's side of the conversation
    #[arg(long)]
    pub save: bool,
}

/// Run the demo conversation and print it.
pub async fn run(config: &Config, args: DemoArgs) -> anyhow::Result<()> {
    let options = ChatOptions {
        save_messages: config.options.save_messages || args.save,
        encryption_enabled: config.options.encryption_enabled && !args.plaintext,
    };
    let store = if options.save_messages {
        Some(
            MessageStore::from_settings(&config.store)
                .await
                .context("failed to open message store")?,
        )
    } else {
        None
    };

    let signal = LocalSignal::new();
    let mut alice = PeerSession::new(
        signal.register(),
        SessionConfig {
            options,
            timeouts: config.session,
        },
        store.clone(),
    )?;
    let mut bob = PeerSession::new(
        signal.register(),
        SessionConfig {
            options: ChatOptions {
                save_messages: false,
                ..options
            },
            timeouts: config.session,
        },
        None,
    )?;

    let bob_id = bob.local_id().clone();
    let (opened, accepted) =
        tokio::join!(alice.start_as_initiator(&bob_id), bob.start_as_responder());
    opened?;
    accepted?;

    let encrypted = options.encryption_enabled;
    let (a, b) = tokio::join!(
        alice.negotiate_encryption(encrypted),
        bob.negotiate_encryption(encrypted)
    );
    a?;
    b?;

    let mut out = io::stdout();
    writeln!(
        out,
        "Connected {} -> {} ({})",
        short_id(alice.local_id().as_str()),
        short_id(bob_id.as_str()),
        if alice.is_secure() { "encrypted" } else { "plaintext" }
    )?;
    if let (Some(local), Some(peer)) = (alice.local_fingerprint(), alice.peer_fingerprint()) {
        writeln!(out, "  initiator key: {local}")?;
        writeln!(out, "  responder key: {peer}")?;
    }

    for text in &args.messages {
        alice.send(MessageKind::Text, text).await?;
        let received = next_message(&mut bob).await?;
        print_message(&mut out, &received)?;

        let reply = format!("got {} bytes", received.content.len());
        bob.send(MessageKind::Text, &reply).await?;
        print_message(&mut out, &next_message(&mut alice).await?)?;
    }

    alice.close();
    bob.close();

    if let Some(store) = store {
        let saved = store.list_messages().await?.len();
        writeln!(out, "{saved} message(s) in {}", store.name())?;
        store.close().await;
    }
    Ok(())
}

/// Wait for the next chat message, skipping drops and store failures.
async fn next_message(session: &mut PeerSession<LocalTransport>) -> anyhow::Result<Message> {
    loop {
        match session.next_event().await? {
            SessionEvent::Message(message) => return Ok(message),
            SessionEvent::Dropped(reason) => warn!(%reason, "Frame dropped"),
            SessionEvent::StoreFailed(e) => warn!(error = %e, "Message not saved"),
            SessionEvent::Closed => anyhow::bail!("peer closed the session"),
        }
    }
}

fn print_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    writeln!(
        out,
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        short_id(&message.peer_id),
        message.content
    )
}
