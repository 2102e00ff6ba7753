//! # Gatehouse - Request Admission Gateway
//!
//! Accepts form submissions from browser clients, admitting only those that
//! come from an allowlisted origin and carry a valid Cloudflare Turnstile
//! token, and persists them into a migrated SQLite store.
//!
//! ## Architecture
//! ```text
//! Browser → Origin Guard → Turnstile siteverify → SQLite
//!                                                   ↑
//!                                  Migration Ledger (startup)
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod admission;
mod config;
mod routes;
mod state;
mod storage;

use config::AppConfig;
use gatehouse_common::{ContactCategory, RecordQuery, constants::DEFAULT_LIST_LIMIT};
use state::AppState;
use storage::{RecordStore, SqliteStore};

/// Gatehouse - origin + CAPTCHA admission gateway
#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gatehouse.toml")]
    config: String,

    /// SQLite database path (overrides config)
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations, then serve HTTP (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Print stored submissions as JSON lines
    List {
        /// Only this category (ERROR, IDEA, TESTIMONIAL, OTHER)
        #[arg(long)]
        category: Option<String>,

        /// Only records created at or after this Unix timestamp
        #[arg(long)]
        since: Option<i64>,

        /// Maximum number of records
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;

    match args.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Migrate) => migrate(&config),
        Some(Command::List {
            ref category,
            since,
            limit,
        }) => list(&config, category.as_deref(), since, limit).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    config.validate()?;

    info!(
        environment = config.environment.as_str(),
        "🔐 Starting Gatehouse v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Migrations finish before the listener exists
    let (conn, ledger, applied) = state::migrate_database(&config)?;
    let status = ledger.status(&conn)?;
    info!(
        applied_now = applied,
        applied_total = status.applied,
        latest = ?status.latest,
        "📋 Database ready: {}",
        config.database_path
    );

    let store = SqliteStore::new(conn, &ledger)?;
    let state = AppState::new(config.clone(), Arc::new(store), status)?;
    info!(
        origins = ?state.gateway.guard().origins().collect::<Vec<_>>(),
        "✅ Admission gateway configured"
    );

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Gatehouse listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("👋 Gatehouse shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

fn migrate(config: &AppConfig) -> Result<()> {
    let (conn, ledger, applied) = state::migrate_database(config)?;

    for row in storage::applied_migrations(&conn)? {
        println!("{:04}  {:<40} {}", row.sequence, row.name, row.applied_at);
    }
    println!(
        "applied {applied} migration(s) this run; {} of {} defined",
        ledger.status(&conn)?.applied,
        ledger.defined()
    );
    Ok(())
}

async fn list(
    config: &AppConfig,
    category: Option<&str>,
    since: Option<i64>,
    limit: usize,
) -> Result<()> {
    let category = category
        .map(str::parse::<ContactCategory>)
        .transpose()?;

    let store = state::open_store(config)?;
    let records = store
        .read(&RecordQuery {
            category,
            since,
            limit,
        })
        .await?;

    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
