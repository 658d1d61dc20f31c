//! Configuration types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::channels::DEFAULT_FEED_SIZE;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exchange endpoints and credential files
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Trading intent for each pair
    #[serde(default)]
    pub pairs: Vec<PairTradeConfig>,
    /// Repricing throttle
    #[serde(default)]
    pub cage: CageConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// ProBit endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Base URL of the exchange REST API
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Base URL of the accounts API issuing tokens
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    /// WebSocket URL for market data
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Plain-text file holding the client id
    #[serde(default = "default_id_file")]
    pub id_file: String,
    /// Plain-text file holding the client secret
    #[serde(default = "default_secret_file")]
    pub secret_file: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            accounts_url: default_accounts_url(),
            websocket_url: default_websocket_url(),
            id_file: default_id_file(),
            secret_file: default_secret_file(),
        }
    }
}

fn default_rest_url() -> String {
    "https://api.probit.com/api/exchange/v1".to_string()
}

fn default_accounts_url() -> String {
    "https://accounts.probit.com".to_string()
}

fn default_websocket_url() -> String {
    "wss://api.probit.com/api/exchange/v1/ws".to_string()
}

fn default_id_file() -> String {
    "probID.txt".to_string()
}

fn default_secret_file() -> String {
    "probSecret.txt".to_string()
}

/// Trading intent for one pair, as configured
///
/// Zero means "unset" for every field. Exactly one of `quantity` and
/// `quote_quantity` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairTradeConfig {
    /// Pair identifier, e.g. `BTC-USDT`
    pub pair: String,
    /// Highest price to buy at (zero: do not buy)
    #[serde(default)]
    pub buy: Decimal,
    /// Lowest price to sell at (zero: do not sell)
    #[serde(default)]
    pub sell: Decimal,
    /// Order size in base currency
    #[serde(default)]
    pub quantity: Decimal,
    /// Order size in quote currency
    #[serde(default)]
    pub quote_quantity: Decimal,
    /// Most base currency to hold
    #[serde(default)]
    pub max_balance: Decimal,
    /// Least base currency to hold
    #[serde(default)]
    pub min_balance: Decimal,
    /// Most base currency to hold, valued in quote currency
    #[serde(default)]
    pub max_quote_balance: Decimal,
    /// Least base currency to hold, valued in quote currency
    #[serde(default)]
    pub min_quote_balance: Decimal,
    /// Approximate price used to turn quote-valued bounds into quantities
    #[serde(default)]
    pub rough_price: Decimal,
}

/// Safety cage parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CageConfig {
    /// How long a placement keeps the cage closed
    #[serde(default = "default_cage_window")]
    pub window_seconds: u64,
    /// Price band around the last placement, in percent
    #[serde(default = "default_cage_band")]
    pub band_percent: Decimal,
}

impl Default for CageConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_cage_window(),
            band_percent: default_cage_band(),
        }
    }
}

fn default_cage_window() -> u64 {
    60
}

fn default_cage_band() -> Decimal {
    Decimal::TWO
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// How often the token is re-checked, in seconds
    #[serde(default = "default_auth_check_interval")]
    pub auth_check_interval_seconds: u64,
    /// Poll interval while waiting out a rate-limit cooldown
    #[serde(default = "default_rate_limit_poll")]
    pub rate_limit_poll_ms: u64,
    /// Delay before each (re)subscription frame
    #[serde(default = "default_subscribe_delay")]
    pub subscribe_delay_ms: u64,
    /// Delay before each reconnection attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Cooldown after a 429 on order placement/cancellation
    #[serde(default = "default_order_penalty")]
    pub order_penalty_seconds: u64,
    /// Cooldown after a 429 on queries
    #[serde(default = "default_query_penalty")]
    pub query_penalty_seconds: u64,
    /// Snapshots buffered per pair before new ones are dropped
    #[serde(default = "default_feed_buffer")]
    pub feed_buffer: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
            auth_check_interval_seconds: default_auth_check_interval(),
            rate_limit_poll_ms: default_rate_limit_poll(),
            subscribe_delay_ms: default_subscribe_delay(),
            reconnect_delay_ms: default_reconnect_delay(),
            order_penalty_seconds: default_order_penalty(),
            query_penalty_seconds: default_query_penalty(),
            feed_buffer: default_feed_buffer(),
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn auth_check_interval(&self) -> Duration {
        Duration::from_secs(self.auth_check_interval_seconds)
    }

    pub fn rate_limit_poll(&self) -> Duration {
        Duration::from_millis(self.rate_limit_poll_ms)
    }

    pub fn subscribe_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn order_penalty(&self) -> Duration {
        Duration::from_secs(self.order_penalty_seconds)
    }

    pub fn query_penalty(&self) -> Duration {
        Duration::from_secs(self.query_penalty_seconds)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_auth_check_interval() -> u64 {
    10
}

fn default_rate_limit_poll() -> u64 {
    10
}

fn default_subscribe_delay() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_order_penalty() -> u64 {
    120
}

fn default_query_penalty() -> u64 {
    650
}

fn default_feed_buffer() -> usize {
    DEFAULT_FEED_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.auth_check_interval(), Duration::from_secs(10));
        assert_eq!(settings.order_penalty(), Duration::from_secs(120));
        assert_eq!(settings.query_penalty(), Duration::from_secs(650));
        assert_eq!(settings.feed_buffer, DEFAULT_FEED_SIZE);

        let from_empty: AppSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(from_empty.feed_buffer, DEFAULT_FEED_SIZE);

        let cage = CageConfig::default();
        assert_eq!(cage.window_seconds, 60);
        assert_eq!(cage.band_percent, Decimal::TWO);
    }

    #[test]
    fn test_pair_config_from_toml_like_json() {
        let pair: PairTradeConfig = serde_json::from_str(
            r#"{"pair": "BTC-USDT", "sell": "90", "quantity": "0.01"}"#,
        )
        .unwrap();
        assert_eq!(pair.pair, "BTC-USDT");
        assert_eq!(pair.sell, Decimal::from(90));
        assert!(pair.buy.is_zero());
        assert!(pair.quote_quantity.is_zero());
    }
}
