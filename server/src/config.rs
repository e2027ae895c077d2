//! Server configuration from environment variables, with defaults suited
//! to local development.

use std::time::Duration;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `DATABASE_URL`.
    pub database_url: String,
    /// `REDIS_URL` (default `redis://127.0.0.1:6379`).
    pub redis_url: String,
    /// `BIND_ADDR` (default `0.0.0.0:3000`).
    pub bind_addr: String,
    /// `GATEWAY_URL` — base URL of the payment gateway.
    pub gateway_url: String,
    /// Outbox poll interval (default 5 s).
    pub dispatch_interval: Duration,
    /// DLQ count check interval (default 60 s).
    pub dlq_check_interval: Duration,
    /// DLQ report interval (default 10 min).
    pub dlq_report_interval: Duration,
    /// Coupon drain interval (default 1 s).
    pub coupon_drain_interval: Duration,
    /// Statistics fold interval (default 30 min).
    pub stats_fold_interval: Duration,
    /// Order expiry sweep interval (default 60 s).
    pub order_expiry_interval: Duration,
}

impl Config {
    /// Read the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Fails when `DATABASE_URL` is missing — everything else has a
    /// default.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        Ok(Self {
            database_url,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            gateway_url: env_or("GATEWAY_URL", "http://127.0.0.1:8090"),
            dispatch_interval: env_secs("DISPATCH_INTERVAL_SECS", 5),
            dlq_check_interval: env_secs("DLQ_CHECK_INTERVAL_SECS", 60),
            dlq_report_interval: env_secs("DLQ_REPORT_INTERVAL_SECS", 600),
            coupon_drain_interval: env_secs("COUPON_DRAIN_INTERVAL_SECS", 1),
            stats_fold_interval: env_secs("STATS_FOLD_INTERVAL_SECS", 1800),
            order_expiry_interval: env_secs("ORDER_EXPIRY_INTERVAL_SECS", 60),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
