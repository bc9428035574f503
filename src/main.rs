//! Mailbox Relay - Main Server
//!
//! Serves the stream / submit endpoints and offers a per-session purge.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mailbox_relay::{relay, AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mailbox-relay")]
#[command(about = "Session relay over an ordered mailbox store")]
struct Cli {
    /// YAML config file (defaults to ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Delete every mailbox record of one session
    Purge {
        /// Session to purge
        #[arg(short, long)]
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mailbox_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            mailbox_relay::start_server(config).await
        }
        Commands::Purge { session_id } => run_purge(config, &session_id).await,
    }
}

async fn run_purge(config: Config, session_id: &str) -> Result<()> {
    let session_id = relay::parse_session_id(Some(session_id))?;
    let state = AppState::new(config).await?;

    let deleted = relay::cleanup_session(state.store.as_ref(), &session_id).await?;
    tracing::info!("Purged {} records of session {}", deleted, session_id);
    Ok(())
}
