//! Epoch trader entry point.
//!
//! Loads configuration, initialises structured logging, resolves the feed
//! set, restores traded-epoch history from the cache directory, and runs
//! the polling loop until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use epoch_trader::chain::rpc::RpcChainClient;
use epoch_trader::chain::ChainClient;
use epoch_trader::config::AppConfig;
use epoch_trader::engine::{spawn_shutdown_listener, GateConfig, PollConfig, TraderAgent};
use epoch_trader::registry::FeedRegistry;
use epoch_trader::storage::EpochHistoryStore;
use epoch_trader::strategy;

#[derive(Parser, Debug)]
#[command(
    name = "epoch-trader",
    about = "Trades on-chain prediction feeds at most once per epoch"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging();

    info!(
        agent_name = %cfg.agent.name,
        feeds = cfg.feeds.len(),
        buffer_secs = cfg.agent.min_buffer_secs,
        strategy = ?cfg.strategy.kind,
        "Epoch trader starting up"
    );

    // -- Initialise components -------------------------------------------

    let rpc_url = AppConfig::resolve_env(&cfg.chain.rpc_url_env)?;
    let client: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(
        SecretString::new(rpc_url),
        Duration::from_secs(cfg.chain.request_timeout_secs),
    )?);

    let registry = FeedRegistry::resolve(&cfg.feeds, client.as_ref())
        .await
        .context("Failed to resolve feeds")?;

    let history = EpochHistoryStore::open(&cfg.cache.dir, cfg.cache.retention, registry.addresses());

    let gate_config = GateConfig {
        min_buffer_secs: cfg.agent.min_buffer_secs,
        prediction_attempts: cfg.agent.prediction_attempts,
        retry_delay: cfg.agent.retry_delay(),
    };
    let poll = PollConfig {
        floor: cfg.agent.poll_floor(),
        ceiling: cfg.agent.poll_ceiling(),
    };

    let mut agent = TraderAgent::new(
        registry,
        client,
        strategy::from_config(&cfg.strategy),
        history,
        gate_config,
        poll,
    )?;

    // -- Main loop -------------------------------------------------------

    let shutdown = spawn_shutdown_listener(tokio::signal::ctrl_c());
    info!(once = cli.once, "Entering main loop. Press Ctrl+C to stop.");

    agent
        .run_until(cli.once, shutdown)
        .await
        .context("Failed to save traded epochs on shutdown")?;

    info!("Epoch trader shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("epoch_trader=info"));

    if std::env::var("TRADER_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
