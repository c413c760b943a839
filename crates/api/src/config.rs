//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::RetryPolicy;
use common::Money;
use domain::PricingPolicy;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `DATABASE_URL`: Postgres connection string; unset runs in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `SHIPPING_COST_CENTS`: flat shipping cost (default: `1000`)
/// - `TAX_RATE_BPS`: tax rate in basis points (default: `1000`)
/// - `CHECKOUT_MAX_ATTEMPTS`: attempts per unit of work (default: `5`)
/// - `CHECKOUT_RETRY_BASE_MS`: first retry delay (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub pricing: PricingPolicy,
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let pricing = PricingPolicy {
            shipping_cost: parse_var(&lookup, "SHIPPING_COST_CENTS")
                .map(Money::from_cents)
                .unwrap_or(defaults.pricing.shipping_cost),
            tax_rate_bps: parse_var(&lookup, "TAX_RATE_BPS")
                .unwrap_or(defaults.pricing.tax_rate_bps),
        };

        let mut retry = defaults.retry;
        if let Some(attempts) = parse_var::<u32>(&lookup, "CHECKOUT_MAX_ATTEMPTS") {
            retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_var(&lookup, "CHECKOUT_RETRY_BASE_MS") {
            retry.base_delay = Duration::from_millis(ms);
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            pricing,
            retry,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            pricing: PricingPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}
