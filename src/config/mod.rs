//! Configuration loading

pub mod credentials;
pub mod loader;
pub mod types;

pub use credentials::load_credentials;
pub use loader::{load_config, load_from_env};
pub use types::{AppConfig, AppSettings, CageConfig, ExchangeConfig, PairTradeConfig};
