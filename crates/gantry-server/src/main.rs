//! Gantry coordinator.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use gantry_config::{CoordinatorConfig, load_config};
use gantry_core::Runner;
use gantry_db::{PgLockFactory, PgMigrator, create_pool};
use gantry_scheduler::MigrationGate;
use gantry_server::Startup;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gantry-coordinator")]
#[command(about = "Gantry CI coordinator", long_about = None)]
struct Cli {
    /// Path to the coordinator configuration
    #[arg(long, env = "GANTRY_CONFIG", default_value = "gantry.kdl")]
    config: PathBuf,

    /// Database connection string, overrides the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator (default)
    Run,
    /// Validate the configuration and print it as JSON
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn read_config(path: &Path) -> anyhow::Result<CoordinatorConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "configuration file not found; using defaults");
        return Ok(CoordinatorConfig::default());
    }
    load_config(path).with_context(|| format!("failed to load {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = read_config(&cli.config)?;

    if let Some(Command::CheckConfig) = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| config.database.url.clone())
        .context("no database url; set DATABASE_URL or `database url=...`")?;

    info!("Connecting to database...");
    let pool = create_pool(&database_url, &config.database).await?;
    info!("Database connected");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received interrupt; shutting down"),
            Err(e) => error!(error = %e, "failed to listen for interrupt; shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(async move {
        if ready_rx.await.is_ok() {
            info!("coordinator ready");
        }
    });

    let locks = PgLockFactory::new(pool.clone());
    let migrator = PgMigrator::new(pool.clone(), locks.clone());
    let gate = MigrationGate::new(
        Startup::new(pool.clone(), locks, config),
        Arc::new(migrator),
    );

    let result = gate.run(shutdown_rx, ready_tx).await;
    pool.close().await;
    result?;

    info!("coordinator stopped");
    Ok(())
}
