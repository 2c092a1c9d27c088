// Keyed async locking for order-book shards and trades
// Bounded wait per attempt, a fixed number of retries, then LockTimeout

use dashmap::DashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Lock acquisition configuration
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Maximum time to wait for the lock on each attempt
    pub wait: Duration,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(5000),
            retry_delay: Duration::from_millis(50),
            max_retries: 2,
        }
    }
}

impl LockConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            wait: millis("LOCK_WAIT_MS", defaults.wait),
            retry_delay: millis("LOCK_RETRY_DELAY_MS", defaults.retry_delay),
            max_retries: env::var("LOCK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Acquire `mutex` with bounded waiting, surfacing `LockTimeout` once retries are exhausted
pub async fn acquire_with_retry<T>(
    mutex: &Arc<Mutex<T>>,
    resource: &str,
    config: &LockConfig,
) -> Result<OwnedMutexGuard<T>, ApiError> {
    for attempt in 0..=config.max_retries {
        match tokio::time::timeout(config.wait, mutex.clone().lock_owned()).await {
            Ok(guard) => {
                if attempt > 0 {
                    debug!(resource = %resource, attempt = attempt + 1, "Lock acquired after retry");
                }
                return Ok(guard);
            }
            Err(_) if attempt < config.max_retries => {
                debug!(
                    resource = %resource,
                    attempt = attempt + 1,
                    "Lock busy, retrying in {:?}",
                    config.retry_delay
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(_) => {}
        }
    }

    warn!(
        resource = %resource,
        attempts = config.max_retries + 1,
        "Failed to acquire lock"
    );
    metrics::counter!("lock_timeouts_total").increment(1);
    Err(ApiError::lock_timeout(resource))
}

/// Named mutexes created on first use
#[derive(Clone)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    config: LockConfig,
}

impl KeyedLocks {
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub async fn acquire(&self, resource: &str) -> Result<OwnedMutexGuard<()>, ApiError> {
        let mutex = self
            .locks
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        acquire_with_retry(&mutex, resource, &self.config).await
    }

    pub async fn acquire_trade(&self, trade_id: i64) -> Result<OwnedMutexGuard<()>, ApiError> {
        self.acquire(&trade_key(trade_id)).await
    }

    /// Drop mutexes nobody holds or waits on
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub fn trade_key(trade_id: i64) -> String {
    format!("trade:{}", trade_id)
}
