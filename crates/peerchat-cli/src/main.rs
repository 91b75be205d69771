//! peerchat CLI
//!
//! Runs an in-process demo conversation and manages the local message store
//! and key backups.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use peerchat_cli::demo_cmd::{self, DemoArgs};
use peerchat_cli::history_cmd::{self, HistoryAction};
use peerchat_cli::key_cmd;
use peerchat_cli::peers_cmd::{self, PeersAction};
use peerchat_core::Config;
use peerchat_core::config::load_config;
use peerchat_core::tracing_init::init_tracing;
use peerchat_store::MessageStore;

#[derive(Parser, Debug)]
#[command(name = "peerchat")]
#[command(version, about = "Peer-to-peer chat with end-to-end encryption", long_about = None)]
struct Cli {
    /// Config file (JSON), layered over the global settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Message store file (overrides config)
    #[arg(long, global = true, env = "PEERCHAT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect two in-process peers and exchange messages
    Demo(DemoArgs),
    /// Saved message history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Known peers
    Peers {
        #[command(subcommand)]
        action: PeersAction,
    },
    /// Generate a key pair and back up its private record
    Keygen {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the fingerprint of a backed-up key
    Keyinfo {
        /// Key file written by `keygen`
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("peerchat=info", cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting peerchat");

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(path) = cli.db_path {
        config.store.path = Some(path);
    }

    match cli.command {
        Command::Demo(args) => demo_cmd::run(&config, args).await?,
        Command::History { action } => {
            let store = open_store(&config).await?;
            history_cmd::run(&store, action).await?;
            store.close().await;
        }
        Command::Peers { action } => {
            let store = open_store(&config).await?;
            peers_cmd::run(&store, action).await?;
            store.close().await;
        }
        Command::Keygen { out, force } => key_cmd::keygen(&out, force).await?,
        Command::Keyinfo { file } => key_cmd::keyinfo(&file)?,
    }

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<MessageStore> {
    MessageStore::from_settings(&config.store)
        .await
        .context("failed to open message store")
}
