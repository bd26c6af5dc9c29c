use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use strainer::config::Config;
use strainer::store::CounterStore;

/// Strainer: write policies for Nostr relays.
///
/// Reads relay policy requests (one JSON object per line) on stdin and
/// answers each with an accept / reject / shadowReject verdict on stdout.
#[derive(Parser)]
#[command(name = "strainer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or migrate) the counter store
    Init,

    /// Evaluate events from stdin until EOF
    Run,

    /// Delete expired counters from the store
    Prune,

    /// Show store and pipeline status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout belongs to the relay.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strainer=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            init_store(&config).await?;
        }

        Commands::Run => {
            let store: Arc<dyn CounterStore> = if config.needs_store() {
                create_store(&config)?
            } else {
                Arc::new(strainer::store::MemoryStore::new())
            };
            let pipeline = config.build_pipeline(store)?;
            info!(policies = ?pipeline.names(), "Strainer ready");

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let stdout = tokio::io::stdout();
            strainer::relay::run(&pipeline, stdin, stdout).await?;
        }

        Commands::Prune => {
            let store = open_store(&config)?;
            let removed = store.prune().await?;
            println!("{} {removed} expired counters removed", "✓".green());
        }

        Commands::Status => {
            println!("Store: {}", config.db_path);
            match open_store(&config) {
                Ok(store) => println!("Live counters: {}", store.count().await?),
                Err(e) => println!("  {} {e}", "Warning:".yellow()),
            }
            let names: Vec<&str> = config.policies.iter().map(|p| p.as_str()).collect();
            println!("Pipeline: {}", names.join(" → ").bold());
        }
    }

    Ok(())
}

/// Open (creating if needed) the counter store for `run`.
#[cfg(feature = "sqlite")]
fn create_store(config: &Config) -> Result<Arc<dyn CounterStore>> {
    Ok(Arc::new(strainer::store::SqliteStore::initialize(
        &config.db_path,
    )?))
}

#[cfg(not(feature = "sqlite"))]
fn create_store(_config: &Config) -> Result<Arc<dyn CounterStore>> {
    tracing::warn!("Built without the 'sqlite' feature; counters will not persist");
    Ok(Arc::new(strainer::store::MemoryStore::new()))
}

/// Open an existing counter store (fails if `init` hasn't run).
#[cfg(feature = "sqlite")]
fn open_store(config: &Config) -> Result<Arc<dyn CounterStore>> {
    Ok(Arc::new(strainer::store::SqliteStore::open(&config.db_path)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &Config) -> Result<Arc<dyn CounterStore>> {
    anyhow::bail!(
        "The 'sqlite' feature is not compiled in, so there is no persistent store.\n\
         Rebuild with: cargo build --features sqlite"
    )
}

#[cfg(feature = "sqlite")]
async fn init_store(config: &Config) -> Result<()> {
    info!("Initializing counter store...");
    let store = strainer::store::SqliteStore::initialize(&config.db_path)?;
    let table_count = store.table_count().await?;
    println!("Store initialized at: {}", config.db_path);
    println!("Tables created: {table_count}");
    println!("\nNext: point your relay's write policy plugin at `strainer run`.");
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn init_store(config: &Config) -> Result<()> {
    open_store(config).map(|_| ())
}
