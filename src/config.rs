//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::trading::TimeInForce;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Polymarket Credentials ===
    /// Wallet private key (hex, optional 0x prefix).
    pub polymarket_private_key: String,

    /// Optional pre-generated API key.
    #[serde(default)]
    pub polymarket_api_key: Option<String>,

    /// Optional API secret.
    #[serde(default)]
    pub polymarket_api_secret: Option<String>,

    /// Optional API passphrase.
    #[serde(default)]
    pub polymarket_api_passphrase: Option<String>,

    // === Wallet Configuration ===
    /// Signature type: 0=EOA, 1=Magic.link proxy, 2=Gnosis Safe.
    #[serde(default = "default_signature_type")]
    pub polymarket_signature_type: u8,

    /// Proxy wallet address (required for Magic.link).
    #[serde(default)]
    pub polymarket_funder: Option<String>,

    // === Endpoints ===
    /// CLOB API base URL.
    #[serde(default = "default_host")]
    pub polymarket_host: String,

    /// Gamma (market metadata) API base URL.
    #[serde(default = "default_gamma_url")]
    pub gamma_api_url: String,

    /// Slug prefix of the 15-minute series, e.g. "btc-updown-15m".
    #[serde(default = "default_slug_prefix")]
    pub market_slug_prefix: String,

    // === Trading Parameters ===
    /// Buy when best ask is at or below this price.
    #[serde(default = "default_buy_price")]
    pub buy_price: Decimal,

    /// Sell a held position when best bid is at or above this price.
    #[serde(default = "default_sell_price")]
    pub sell_price: Decimal,

    /// Number of shares per order.
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,

    /// Order type: FOK, FAK, or GTC.
    #[serde(default = "default_order_type")]
    pub order_type: String,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    // === Loop Timing ===
    /// Delay between scan iterations in milliseconds.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Minimum seconds between market rollover checks.
    #[serde(default = "default_rollover_check_secs")]
    pub rollover_check_secs: u64,

    /// Emit a status report every N scan iterations.
    #[serde(default = "default_status_every")]
    pub status_every: u64,

    /// Consecutive price feed failures that force market re-discovery.
    #[serde(default = "default_max_feed_failures")]
    pub max_feed_failures: u32,

    /// Pause after an order is accepted before its status is read.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Observability ===
    /// Serve Prometheus metrics on this port when set.
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_signature_type() -> u8 {
    1
}

/// Default CLOB API base URL.
pub const DEFAULT_HOST: &str = "https://clob.polymarket.com";
/// Default Gamma API base URL.
pub const DEFAULT_GAMMA_URL: &str = "https://gamma-api.polymarket.com";
/// Default 15-minute series slug prefix.
pub const DEFAULT_SLUG_PREFIX: &str = "btc-updown-15m";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_gamma_url() -> String {
    DEFAULT_GAMMA_URL.to_string()
}

fn default_slug_prefix() -> String {
    DEFAULT_SLUG_PREFIX.to_string()
}

fn default_buy_price() -> Decimal {
    Decimal::new(80, 2) // 0.80
}

fn default_sell_price() -> Decimal {
    Decimal::new(90, 2) // 0.90
}

fn default_order_size() -> Decimal {
    Decimal::new(5, 0) // 5 shares
}

fn default_order_type() -> String {
    "FOK".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_rollover_check_secs() -> u64 {
    10
}

fn default_status_every() -> u64 {
    10
}

fn default_max_feed_failures() -> u32 {
    8
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build configuration from explicit key/value pairs, applying the same
    /// defaults as [`Config::load`].
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        envy::from_iter(pairs.into_iter().map(|(k, v)| (k.into(), v.into())))
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.polymarket_private_key.trim().is_empty() {
            return Err("POLYMARKET_PRIVATE_KEY is required".to_string());
        }

        let creds = [
            &self.polymarket_api_key,
            &self.polymarket_api_secret,
            &self.polymarket_api_passphrase,
        ];
        let present = creds
            .iter()
            .filter(|c| c.as_deref().is_some_and(|s| !s.is_empty()))
            .count();
        if present != 0 && present != creds.len() {
            return Err(
                "POLYMARKET_API_KEY, POLYMARKET_API_SECRET and POLYMARKET_API_PASSPHRASE must be set together"
                    .to_string(),
            );
        }

        if self.buy_price <= Decimal::ZERO || self.buy_price >= Decimal::ONE {
            return Err("BUY_PRICE must be between 0 and 1".to_string());
        }

        if self.sell_price <= Decimal::ZERO || self.sell_price >= Decimal::ONE {
            return Err("SELL_PRICE must be between 0 and 1".to_string());
        }

        if self.buy_price >= self.sell_price {
            return Err(format!(
                "BUY_PRICE ({}) must be less than SELL_PRICE ({})",
                self.buy_price, self.sell_price
            ));
        }

        if self.order_size <= Decimal::ZERO {
            return Err("ORDER_SIZE must be greater than 0".to_string());
        }

        if self.status_every == 0 {
            return Err("STATUS_EVERY must be at least 1".to_string());
        }

        self.time_in_force()?;

        for (name, value) in [
            ("POLYMARKET_HOST", &self.polymarket_host),
            ("GAMMA_API_URL", &self.gamma_api_url),
        ] {
            url::Url::parse(value).map_err(|e| format!("{} is not a valid URL: {}", name, e))?;
        }

        Ok(())
    }

    /// Parsed order type.
    pub fn time_in_force(&self) -> Result<TimeInForce, String> {
        TimeInForce::from_str(self.order_type.trim())
            .map_err(|_| format!("ORDER_TYPE must be FOK, FAK or GTC, got {}", self.order_type))
    }

    /// Whether L2 API credentials were supplied.
    pub fn has_api_creds(&self) -> bool {
        self.polymarket_api_key.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Check if using Magic.link (signature_type == 1).
    pub fn is_magic_link(&self) -> bool {
        self.polymarket_signature_type == 1
    }

    /// Cash needed for one buy at the configured threshold.
    pub fn min_required_balance(&self) -> Decimal {
        self.order_size * self.buy_price
    }

    /// HTTP timeout as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn config_with(extra: &[(&str, &str)]) -> Config {
        let mut pairs = vec![("POLYMARKET_PRIVATE_KEY", KEY)];
        pairs.extend_from_slice(extra);
        Config::from_pairs(pairs).unwrap()
    }

    #[test]
    fn default_values_are_sensible() {
        let config = config_with(&[]);
        assert_eq!(config.buy_price, dec!(0.80));
        assert_eq!(config.sell_price, dec!(0.90));
        assert_eq!(config.order_size, dec!(5));
        assert_eq!(config.polymarket_signature_type, 1);
        assert_eq!(config.max_feed_failures, 8);
        assert_eq!(config.rollover_check_secs, 10);
        assert_eq!(config.time_in_force().unwrap(), TimeInForce::FOK);
        assert!(config.dry_run);
        assert!(config.metrics_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_values_override_defaults() {
        let config = config_with(&[
            ("BUY_PRICE", "0.75"),
            ("SELL_PRICE", "0.95"),
            ("ORDER_SIZE", "10"),
            ("DRY_RUN", "false"),
            ("ORDER_TYPE", "gtc"),
        ]);
        assert_eq!(config.buy_price, dec!(0.75));
        assert_eq!(config.sell_price, dec!(0.95));
        assert_eq!(config.order_size, dec!(10));
        assert!(!config.dry_run);
        assert_eq!(config.time_in_force().unwrap(), TimeInForce::GTC);
        assert_eq!(config.min_required_balance(), dec!(7.50));
    }

    #[test]
    fn validate_rejects_empty_private_key() {
        let config = Config::from_pairs([("POLYMARKET_PRIVATE_KEY", "")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let config = config_with(&[("BUY_PRICE", "0.90"), ("SELL_PRICE", "0.90")]);
        assert!(config.validate().unwrap_err().contains("less than SELL_PRICE"));

        let config = config_with(&[("SELL_PRICE", "1.2")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_size() {
        let config = config_with(&[("ORDER_SIZE", "0")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_complete_api_creds() {
        let config = config_with(&[("POLYMARKET_API_KEY", "key")]);
        assert!(config.validate().is_err());

        let config = config_with(&[
            ("POLYMARKET_API_KEY", "key"),
            ("POLYMARKET_API_SECRET", "secret"),
            ("POLYMARKET_API_PASSPHRASE", "pass"),
        ]);
        assert!(config.validate().is_ok());
        assert!(config.has_api_creds());
    }

    #[test]
    fn validate_rejects_bad_order_type_and_host() {
        let config = config_with(&[("ORDER_TYPE", "IOC")]);
        assert!(config.validate().is_err());

        let config = config_with(&[("POLYMARKET_HOST", "not a url")]);
        assert!(config.validate().is_err());
    }
}
