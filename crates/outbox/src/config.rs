//! Publisher configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::TargetService;

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Base URL per target service.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub order: String,
    pub payment: String,
    pub inventory: String,
    pub shipping: String,
}

impl ServiceUrls {
    /// Reads `{SERVICE}_SERVICE_URL` variables, falling back to the local
    /// four-port layout.
    pub fn from_env() -> Self {
        Self {
            order: env_or("ORDER_SERVICE_URL", "http://localhost:3001"),
            payment: env_or("PAYMENT_SERVICE_URL", "http://localhost:3002"),
            inventory: env_or("INVENTORY_SERVICE_URL", "http://localhost:3003"),
            shipping: env_or("SHIPPING_SERVICE_URL", "http://localhost:3004"),
        }
    }

    /// Points every service at the same base URL (tests).
    pub fn uniform(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            order: base.clone(),
            payment: base.clone(),
            inventory: base.clone(),
            shipping: base,
        }
    }

    /// Returns the base URL for a target service.
    pub fn base(&self, service: TargetService) -> &str {
        match service {
            TargetService::Order => &self.order,
            TargetService::Payment => &self.payment,
            TargetService::Inventory => &self.inventory,
            TargetService::Shipping => &self.shipping,
        }
    }
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            order: "http://localhost:3001".to_string(),
            payment: "http://localhost:3002".to_string(),
            inventory: "http://localhost:3003".to_string(),
            shipping: "http://localhost:3004".to_string(),
        }
    }
}

/// Outbox publisher settings.
///
/// Environment variables:
/// - `BATCH_SIZE` — events fetched per poll cycle (default: `10`)
/// - `POLL_INTERVAL_MS` — sleep between polls (default: `1000`)
/// - `REQUEST_TIMEOUT_MS` — per-request HTTP timeout (default: `5000`)
/// - `MAX_RETRIES` — publish attempts before terminal failure (default: `3`)
/// - `{ORDER,PAYMENT,INVENTORY,SHIPPING}_SERVICE_URL` — target base URLs
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: i32,
    pub urls: ServiceUrls,
}

impl PublisherConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            batch_size: env_parse("BATCH_SIZE", 10),
            poll_interval: Duration::from_millis(env_parse("POLL_INTERVAL_MS", 1_000)),
            request_timeout: Duration::from_millis(env_parse("REQUEST_TIMEOUT_MS", 5_000)),
            max_retries: env_parse("MAX_RETRIES", 3),
            urls: ServiceUrls::from_env(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(1_000),
            request_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            urls: ServiceUrls::default(),
        }
    }
}
