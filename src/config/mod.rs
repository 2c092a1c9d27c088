use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::services::lock::LockConfig;
use crate::services::settlement::SettlementConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiration: i64,
    pub request_timeout: u64,
    pub log_format: LogFormat,
    /// Optional JSON file with categories, products and options
    pub catalog_seed_path: Option<String>,
    pub matching: MatchingConfig,
    pub lock: LockConfig,
    pub penalty: PenaltyConfig,
    pub trade: TradeConfig,
    pub settlement: SettlementConfig,
    pub payment: PaymentConfig,
    pub notification: NotificationConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Invalid log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub bid_expiry_days: i64,
    pub expiry_sweep_secs: u64,
    pub admin_page_size: usize,
    /// Run a full matching sweep once the catalog is seeded
    pub sweep_on_startup: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            bid_expiry_days: 7,
            expiry_sweep_secs: 60,
            admin_page_size: 10,
            sweep_on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    pub cooldown_days: i64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self { cooldown_days: 3 }
    }
}

#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// How long a buyer has to pay before the trade is cancelled
    pub payment_window_minutes: i64,
    pub expiry_sweep_secs: u64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            payment_window_minutes: 24 * 60,
            expiry_sweep_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Mock,
    PortOne,
}

impl FromStr for PaymentProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(PaymentProviderKind::Mock),
            "portone" => Ok(PaymentProviderKind::PortOne),
            other => Err(format!("Invalid payment provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub provider: PaymentProviderKind,
    pub portone_base_url: String,
    pub portone_api_secret: String,
    pub portone_store_id: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            provider: PaymentProviderKind::Mock,
            portone_base_url: "https://api.portone.io".to_string(),
            portone_api_secret: String::new(),
            portone_store_id: String::new(),
            retry_attempts: 3,
            retry_delay_ms: 200,
            http_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
    pub redelivery_interval_secs: u64,
    pub sse_keepalive_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            redelivery_interval_secs: 5,
            sse_keepalive_secs: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Burst of bid mutations a user may issue
    pub bid_capacity: u32,
    /// Tokens restored per second
    pub bid_refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bid_capacity: 20,
            bid_refill_per_sec: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 8080,
            jwt_secret: String::new(),
            jwt_issuer: "resale-exchange".to_string(),
            jwt_expiration: 86400,
            request_timeout: 30,
            log_format: LogFormat::Pretty,
            catalog_seed_path: None,
            matching: MatchingConfig::default(),
            lock: LockConfig::default(),
            penalty: PenaltyConfig::default(),
            trade: TradeConfig::default(),
            settlement: SettlementConfig::default(),
            payment: PaymentConfig::default(),
            notification: NotificationConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Read an optional variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();

        let payment_defaults = PaymentConfig::default();
        let provider = match env::var("PAYMENT_PROVIDER") {
            Ok(v) => v.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            Err(_) => payment_defaults.provider,
        };

        let payment = PaymentConfig {
            provider,
            portone_base_url: env::var("PORTONE_BASE_URL")
                .unwrap_or(payment_defaults.portone_base_url),
            portone_api_secret: env::var("PORTONE_API_SECRET").unwrap_or_default(),
            portone_store_id: env::var("PORTONE_STORE_ID").unwrap_or_default(),
            retry_attempts: env_or("PAYMENT_RETRY_ATTEMPTS", payment_defaults.retry_attempts),
            retry_delay_ms: env_or("PAYMENT_RETRY_DELAY_MS", payment_defaults.retry_delay_ms),
            http_timeout_secs: env_or(
                "PAYMENT_HTTP_TIMEOUT_SECS",
                payment_defaults.http_timeout_secs,
            ),
        };

        if payment.provider == PaymentProviderKind::PortOne
            && (payment.portone_api_secret.is_empty() || payment.portone_store_id.is_empty())
        {
            return Err(anyhow::anyhow!(
                "PORTONE_API_SECRET and PORTONE_STORE_ID are required when PAYMENT_PROVIDER=portone"
            ));
        }

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_expiration: env_or("JWT_EXPIRATION", defaults.jwt_expiration),
            request_timeout: env_or("REQUEST_TIMEOUT", defaults.request_timeout),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            catalog_seed_path: env::var("CATALOG_SEED_PATH").ok(),
            matching: MatchingConfig {
                bid_expiry_days: env_or("BID_EXPIRY_DAYS", defaults.matching.bid_expiry_days),
                expiry_sweep_secs: env_or(
                    "BID_EXPIRY_SWEEP_SECS",
                    defaults.matching.expiry_sweep_secs,
                ),
                admin_page_size: env_or("ADMIN_PAGE_SIZE", defaults.matching.admin_page_size),
                sweep_on_startup: env_or(
                    "MATCHING_SWEEP_ON_STARTUP",
                    defaults.matching.sweep_on_startup,
                ),
            },
            lock: LockConfig::from_env(),
            penalty: PenaltyConfig {
                cooldown_days: env_or("PENALTY_DAYS", defaults.penalty.cooldown_days),
            },
            trade: TradeConfig {
                payment_window_minutes: env_or(
                    "PAYMENT_WINDOW_MINUTES",
                    defaults.trade.payment_window_minutes,
                ),
                expiry_sweep_secs: env_or(
                    "TRADE_EXPIRY_SWEEP_SECS",
                    defaults.trade.expiry_sweep_secs,
                ),
            },
            settlement: SettlementConfig::from_env(),
            payment,
            notification: NotificationConfig {
                channel_capacity: env_or(
                    "NOTIFICATION_CHANNEL_CAPACITY",
                    defaults.notification.channel_capacity,
                ),
                redelivery_interval_secs: env_or(
                    "NOTIFICATION_REDELIVERY_SECS",
                    defaults.notification.redelivery_interval_secs,
                ),
                sse_keepalive_secs: env_or(
                    "SSE_KEEPALIVE_SECS",
                    defaults.notification.sse_keepalive_secs,
                ),
            },
            rate_limit: RateLimitConfig {
                bid_capacity: env_or("BID_RATE_CAPACITY", defaults.rate_limit.bid_capacity),
                bid_refill_per_sec: env_or(
                    "BID_RATE_REFILL_PER_SEC",
                    defaults.rate_limit.bid_refill_per_sec,
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_marketplace_rules() {
        let config = Config::default();
        assert_eq!(config.penalty.cooldown_days, 3);
        assert_eq!(config.matching.bid_expiry_days, 7);
        assert_eq!(config.matching.admin_page_size, 10);
        assert_eq!(config.payment.provider, PaymentProviderKind::Mock);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(
            "portone".parse::<PaymentProviderKind>().unwrap(),
            PaymentProviderKind::PortOne
        );
        assert!("stripe".parse::<PaymentProviderKind>().is_err());
    }
}
