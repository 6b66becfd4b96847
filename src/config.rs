//! Configuration management for the reward engine.
//!
//! All settings carry safe defaults for dev mode and can be overridden
//! through `T4G_`-prefixed environment variables. Validation happens once
//! at startup, before any component is constructed.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::ledger::DEV_POOL_ADDRESS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub ledger: LedgerConfig,
    pub fraud: FraudSettings,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Per-IP request rate limit per minute
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Enable request logging
    pub log_requests: bool,
    /// Sanitize client IPs in logs
    pub sanitize_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Rewards pool address payouts are drawn from
    pub pool_address: String,
    /// Initial dev-mode pool balance
    pub dev_pool_balance: u64,
    /// Hard cap on a single payout
    pub single_payout_cap: u64,
    /// Seconds a finality watcher waits before declaring failure
    pub finality_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudSettings {
    /// Risk score at or above which payouts are denied
    pub alert_threshold: f64,
    /// Per-user daily reward-amount cap
    pub daily_amount_cap: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fast in-process tier TTL in seconds
    pub fast_ttl_secs: u64,
    /// Shared tier TTL in seconds
    pub shared_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// If false, the engine runs on the in-memory store
    pub postgres_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8090,
            },
            security: SecurityConfig {
                rate_limit_per_minute: 60,
                max_request_size: 1024 * 1024,
                log_requests: true,
                sanitize_logs: true,
            },
            ledger: LedgerConfig {
                pool_address: DEV_POOL_ADDRESS.to_string(),
                dev_pool_balance: 1_000_000_000,
                single_payout_cap: 10_000,
                finality_timeout_secs: 120,
            },
            fraud: FraudSettings {
                alert_threshold: 0.7,
                daily_amount_cap: 1000,
            },
            cache: CacheConfig {
                fast_ttl_secs: 60,
                shared_ttl_secs: 300,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/t4g_rewards".to_string(),
                postgres_enabled: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("T4G_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("T4G_PORT") {
            config.server.port = port.parse().context("T4G_PORT must be a port number")?;
        }
        if let Ok(limit) = env::var("T4G_RATE_LIMIT_PER_MINUTE") {
            config.security.rate_limit_per_minute = limit
                .parse()
                .context("T4G_RATE_LIMIT_PER_MINUTE must be numeric")?;
        }
        if let Ok(pool) = env::var("T4G_POOL_ADDRESS") {
            config.ledger.pool_address = pool;
        }
        if let Ok(cap) = env::var("T4G_SINGLE_PAYOUT_CAP") {
            config.ledger.single_payout_cap = cap
                .parse()
                .context("T4G_SINGLE_PAYOUT_CAP must be numeric")?;
        }
        if let Ok(timeout) = env::var("T4G_FINALITY_TIMEOUT_SECS") {
            config.ledger.finality_timeout_secs = timeout
                .parse()
                .context("T4G_FINALITY_TIMEOUT_SECS must be numeric")?;
        }
        if let Ok(threshold) = env::var("T4G_FRAUD_ALERT_THRESHOLD") {
            config.fraud.alert_threshold = threshold
                .parse()
                .context("T4G_FRAUD_ALERT_THRESHOLD must be a float")?;
        }
        if let Ok(cap) = env::var("T4G_DAILY_AMOUNT_CAP") {
            config.fraud.daily_amount_cap =
                cap.parse().context("T4G_DAILY_AMOUNT_CAP must be numeric")?;
        }
        if let Ok(url) = env::var("T4G_POSTGRES_URL") {
            config.database.postgres_url = url;
            config.database.postgres_enabled = true;
        }
        if let Ok(level) = env::var("T4G_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fraud.alert_threshold) {
            bail!(
                "fraud alert threshold {} must be within [0, 1]",
                self.fraud.alert_threshold
            );
        }
        if self.ledger.single_payout_cap == 0 {
            bail!("single payout cap must be positive");
        }
        if !crate::ledger::is_valid_address(&self.ledger.pool_address) {
            bail!("malformed pool address {}", self.ledger.pool_address);
        }
        if self.cache.fast_ttl_secs >= self.cache.shared_ttl_secs {
            bail!("fast cache tier must expire before the shared tier");
        }
        Ok(())
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.finality_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut config = EngineConfig::default();
        config.fraud.alert_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_cache_ttls() {
        let mut config = EngineConfig::default();
        config.cache.fast_ttl_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_pool_address() {
        let mut config = EngineConfig::default();
        config.ledger.pool_address = "not-hex".into();
        assert!(config.validate().is_err());
    }
}
