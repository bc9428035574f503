//! Administrative mailbox reset
//!
//! Deletes every record in the configured mailbox store, across all
//! sessions. Without `--yes` it only reports what would be removed.

use anyhow::Result;
use clap::Parser;
use mailbox_relay::mailbox::Position;
use mailbox_relay::{relay, AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mailbox_reset")]
#[command(about = "Delete every record in the mailbox store")]
struct Cli {
    /// YAML config file (defaults to ./config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Actually delete; otherwise only count
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mailbox_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;
    let state = AppState::new(config).await?;
    let store = state.store.as_ref();

    if !cli.yes {
        let sessions = relay::cleanup::list_all_sessions(store).await?;
        let mut records = 0;
        for session_id in &sessions {
            records += store
                .query_after(session_id, Position::ZERO)
                .await?
                .len();
        }
        println!(
            "{} sessions, {} records would be deleted. Re-run with --yes to delete.",
            sessions.len(),
            records
        );
        return Ok(());
    }

    let report = relay::purge_all(store).await?;
    println!(
        "Deleted {} records across {} sessions",
        report.records, report.sessions
    );
    if !report.failed.is_empty() {
        anyhow::bail!("{} sessions could not be purged", report.failed.len());
    }
    Ok(())
}
