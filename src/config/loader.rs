//! Configuration loader

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use std::path::Path;

use super::types::{AppConfig, PairTradeConfig};
use crate::common::errors::{ClientError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP_, `__` as separator)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ClientError::Configuration(e.to_string()))
}

/// Load configuration from environment variables only
///
/// Reads `PROBIT_*` endpoint overrides and a single pair described by
/// `PROBIT_PAIR`, `PROBIT_BUY`, `PROBIT_SELL`, `PROBIT_QUANTITY` and
/// `PROBIT_QUOTE_QUANTITY`.
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::default();
    if let Ok(url) = std::env::var("PROBIT_REST_URL") {
        config.exchange.rest_url = url;
    }
    if let Ok(url) = std::env::var("PROBIT_ACCOUNTS_URL") {
        config.exchange.accounts_url = url;
    }
    if let Ok(url) = std::env::var("PROBIT_WS_URL") {
        config.exchange.websocket_url = url;
    }

    if let Ok(pair) = std::env::var("PROBIT_PAIR") {
        config.pairs.push(PairTradeConfig {
            pair,
            buy: env_decimal("PROBIT_BUY")?,
            sell: env_decimal("PROBIT_SELL")?,
            quantity: env_decimal("PROBIT_QUANTITY")?,
            quote_quantity: env_decimal("PROBIT_QUOTE_QUANTITY")?,
            ..PairTradeConfig::default()
        });
    }

    Ok(config)
}

fn env_decimal(name: &str) -> Result<Decimal> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| ClientError::Configuration(format!("{}: {}", name, e))),
        Err(_) => Ok(Decimal::ZERO),
    }
}
