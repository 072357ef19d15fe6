use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use ulid::Ulid;

use rentald::config::Config;
use rentald::engine::Engine;
use rentald::notify::NotificationStore;

/// Offline administration of a rental data directory.
#[derive(Debug, Parser)]
#[command(name = "rentald", version)]
struct Cli {
    /// Overrides RENTAL_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Overrides RENTAL_METRICS_PORT.
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay the logs and print a summary as JSON.
    Inspect,
    /// Print one item's day-by-day availability as JSON.
    Calendar {
        equipment: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// Rewrite both logs down to current state.
    Compact,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if cli.metrics_port.is_some() {
        config.metrics_port = cli.metrics_port;
    }
    rentald::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    info!("data_dir: {}", config.data_dir.display());

    let notifications = Arc::new(
        NotificationStore::open(config.notification_wal_path(), config.compact_threshold).await?,
    );
    let engine = Engine::open(
        config.rental_wal_path(),
        notifications.clone(),
        config.compact_threshold,
    )
    .await?;

    match cli.command {
        Command::Inspect => {
            let summary = engine.summary().await;
            let out = serde_json::json!({
                "engine": summary,
                "notifications": notifications.len(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Calendar {
            equipment,
            from,
            to,
        } => {
            let days = engine.get_availability(equipment, from, to).await?;
            println!("{}", serde_json::to_string_pretty(&days)?);
        }
        Command::Compact => {
            engine.compact_wal().await?;
            notifications.compact().await?;
            info!("compaction complete");
        }
    }
    Ok(())
}
