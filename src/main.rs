//! probit_compete - Main Entry Point
//!
//! Quotes one buy and one sell per configured pair on ProBit, just inside
//! the best rival prices.

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use probit_compete::config::{load_config, load_from_env, AppConfig, PairTradeConfig};
use probit_compete::{
    pair_feed, run_pair, BookSummary, CompeteEngine, ExchangeGateway, ExchangeSession, OrderBookTracker,
    SafetyCage, TradingIntent,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; falls back to `PROBIT_*` variables when absent
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Only trade these pairs from the configuration (repeatable)
    #[arg(long)]
    pair: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = if Path::new(&args.config).exists() {
        load_config(Some(&args.config)).context("loading configuration")?
    } else {
        load_from_env().context("loading configuration from the environment")?
    };
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level)?;

    info!("Starting probit_compete");
    info!("Configuration file: {}", args.config);

    let pairs = selected_pairs(&config, &args.pair);
    if pairs.is_empty() {
        anyhow::bail!("no pairs to trade");
    }

    let session = Arc::new(ExchangeSession::from_config(&config).context("creating session")?);
    session.fetch_all_specs().await.context("fetching pair specs")?;
    let auth = session.start_auth().await;

    let mut runners = Vec::with_capacity(pairs.len());
    for pair_config in pairs {
        let pair = pair_config.pair.clone();
        let spec = session.get_spec(&pair).await?;
        let gateway: Arc<dyn ExchangeGateway> = session.clone();
        let mut tracker = OrderBookTracker::new(spec, gateway);
        if let Err(e) = tracker.refresh_market_from_rest().await {
            warn!(pair = %pair, "Could not prime the order book: {}", e);
        }

        let rough_price = rough_price(&pair_config, tracker.book());
        let intent = TradingIntent::from_config(&pair_config, rough_price)
            .with_context(|| format!("trading intent for {}", pair))?;
        info!(pair = %pair, ?intent, %rough_price, "Trading intent");
        let engine = CompeteEngine::new(intent, SafetyCage::from_config(&config.cage));

        let (feed, events) = pair_feed(&pair, config.settings.feed_buffer);
        session.register_pair(&pair, feed).await?;
        runners.push(tokio::spawn(run_pair(tracker, engine, events)));
    }

    session.open_stream().await?;
    info!("Application initialized successfully");

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    session.close_stream().await?;
    auth.abort();
    for pair in session.registered_pairs().await {
        session.unregister_pair(&pair).await?;
    }

    for runner in runners {
        match runner.await {
            Ok(tracker) => match tracker.report_history().await {
                Ok((base, quote)) => info!(pair = %tracker.pair(), %base, %quote, "Session result"),
                Err(e) => warn!(pair = %tracker.pair(), "Could not fetch trade history: {}", e),
            },
            Err(e) => error!("Pair runner failed: {}", e),
        }
    }

    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` wins over `level` when set
fn init_logging(level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn selected_pairs(config: &AppConfig, only: &[String]) -> Vec<PairTradeConfig> {
    config
        .pairs
        .iter()
        .filter(|p| only.is_empty() || only.contains(&p.pair))
        .cloned()
        .collect()
}

/// Configured rough price, else the book mid, else whichever side exists
fn rough_price(pair: &PairTradeConfig, book: &BookSummary) -> Decimal {
    if !pair.rough_price.is_zero() {
        return pair.rough_price;
    }
    match (book.best_buy.is_present(), book.best_sell.is_present()) {
        (true, true) => (book.best_buy.price + book.best_sell.price) / Decimal::TWO,
        (true, false) => book.best_buy.price,
        (false, true) => book.best_sell.price,
        (false, false) => Decimal::ZERO,
    }
}
