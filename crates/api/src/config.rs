//! Service configuration loaded from environment variables.

use outbox::PublisherConfig;
use saga::TargetService;

/// Per-process configuration.
///
/// Reads from environment variables:
/// - `SERVICE` — which participant this process is
///   (`order|payment|inventory|shipping`, default: `order`)
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: the service's slot in `3001..3004`)
/// - `DATABASE_URL` — PostgreSQL connection string (default: `None`, uses
///   in-memory stores)
/// - `DB_MAX_CONNECTIONS` — max database pool connections (default: `10`)
/// - `PAYMENT_FAILURE_RATE` — simulated decline rate (default: `0.1`)
///
/// plus the publisher variables documented on
/// [`PublisherConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub service: TargetService,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub payment_failure_rate: f64,
    pub publisher: PublisherConfig,
}

/// The local port layout the default service URLs point at.
fn default_port(service: TargetService) -> u16 {
    match service {
        TargetService::Order => 3001,
        TargetService::Payment => 3002,
        TargetService::Inventory => 3003,
        TargetService::Shipping => 3004,
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let service = std::env::var("SERVICE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(TargetService::Order);
        Self {
            service,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| default_port(service)),
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            payment_failure_rate: std::env::var("PAYMENT_FAILURE_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.1),
            publisher: PublisherConfig::from_env(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: TargetService::Order,
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_url: None,
            db_max_connections: 10,
            payment_failure_rate: 0.1,
            publisher: PublisherConfig::default(),
        }
    }
}
