use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::database::Store;
use crate::models::{SettlementStatus, TradeStatus};
use crate::services::lock::KeyedLocks;
use crate::services::order_book::OrderBook;

/// Counts describing the current market
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStats {
    pub pending_bids: usize,
    pub waiting_trades: usize,
    pub pending_settlements: usize,
    pub order_book_shards: usize,
    pub held_locks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthStatus {
    pub status: HealthCheckStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
    pub stats: ExchangeStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthCheckStatus,
    pub response_time_ms: Option<u64>,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health checker service
#[derive(Clone)]
pub struct HealthChecker {
    start_time: Arc<Instant>,
    store: Store,
    book: OrderBook,
    locks: KeyedLocks,
    environment: String,
    payment_provider: &'static str,
}

impl HealthChecker {
    pub fn new(
        store: Store,
        book: OrderBook,
        locks: KeyedLocks,
        environment: String,
        payment_provider: &'static str,
    ) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            store,
            book,
            locks,
            environment,
            payment_provider,
        }
    }

    /// Get uptime in seconds
    pub fn get_uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Probe every option shard without waiting on it
    async fn check_order_book(&self) -> DependencyHealth {
        let start = Instant::now();
        let option_ids = self.book.option_ids();
        let mut busy = 0;
        for option_id in &option_ids {
            // a shard held for longer than this is reported, not waited on
            if tokio::time::timeout(Duration::from_millis(50), self.book.lock(*option_id))
                .await
                .map(|r| r.is_err())
                .unwrap_or(true)
            {
                busy += 1;
            }
        }

        DependencyHealth {
            name: "order_book".to_string(),
            status: if busy == 0 {
                HealthCheckStatus::Healthy
            } else {
                HealthCheckStatus::Degraded
            },
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            last_check: Utc::now(),
            details: Some(format!("{} shards, {} busy", option_ids.len(), busy)),
        }
    }

    fn payment_provider(&self) -> DependencyHealth {
        DependencyHealth {
            name: "payment_provider".to_string(),
            status: HealthCheckStatus::Healthy,
            response_time_ms: None,
            last_check: Utc::now(),
            details: Some(format!("provider: {}", self.payment_provider)),
        }
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            pending_bids: self.store.bids.iter().filter(|b| b.is_pending()).count(),
            waiting_trades: self
                .store
                .trades
                .iter()
                .filter(|t| t.status == TradeStatus::WaitingPayment)
                .count(),
            pending_settlements: self
                .store
                .settlements
                .iter()
                .filter(|s| s.status == SettlementStatus::Pending)
                .count(),
            order_book_shards: self.book.option_ids().len(),
            held_locks: self.locks.len(),
        }
    }

    pub async fn perform_health_check(&self) -> DetailedHealthStatus {
        let dependencies = vec![self.check_order_book().await, self.payment_provider()];

        let status = if dependencies
            .iter()
            .all(|d| d.status == HealthCheckStatus::Healthy)
        {
            HealthCheckStatus::Healthy
        } else if dependencies
            .iter()
            .any(|d| d.status == HealthCheckStatus::Unhealthy)
        {
            HealthCheckStatus::Unhealthy
        } else {
            HealthCheckStatus::Degraded
        };

        DetailedHealthStatus {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: self.environment.clone(),
            uptime_seconds: self.get_uptime(),
            dependencies,
            stats: self.stats(),
        }
    }
}
