// Audit logging service for privileged and security events
// Keeps an append-only trail of admin overrides, trade cancellations and refunds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

/// Events written to the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Admin cancelled a pending bid
    BidForceCancelled {
        admin_id: i64,
        bid_id: i64,
        owner_id: i64,
        reason_code: String,
        comment: String,
    },
    /// Admin cancelled a trade awaiting payment
    TradeForceCancelled {
        admin_id: i64,
        trade_id: i64,
        reason_code: String,
        comment: String,
    },
    /// A party cancelled its own trade and was penalised
    TradeCancelled {
        user_id: i64,
        trade_id: i64,
        penalty_until: DateTime<Utc>,
    },
    /// Unpaid trade expired
    TradeExpired { trade_id: i64, buyer_id: i64 },
    /// Payment verified against the provider
    PaymentCompleted {
        user_id: i64,
        payment_id: i64,
        trade_id: i64,
        amount: i64,
    },
    /// Provider reported an amount different from the trade price
    PaymentMismatch {
        user_id: i64,
        payment_id: i64,
        expected: i64,
        actual: i64,
    },
    /// Settlement refunded
    RefundIssued {
        requested_by: i64,
        settlement_id: i64,
        amount: i64,
        reason: String,
    },
    /// Manual matching sweep triggered
    MatchingSweep { admin_id: i64, trades_created: usize },
    /// Caller lacked the role for an admin endpoint
    UnauthorizedAccess { user_id: i64, endpoint: String },
}

impl AuditEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::BidForceCancelled { .. } => "bid_force_cancelled",
            AuditEvent::TradeForceCancelled { .. } => "trade_force_cancelled",
            AuditEvent::TradeCancelled { .. } => "trade_cancelled",
            AuditEvent::TradeExpired { .. } => "trade_expired",
            AuditEvent::PaymentCompleted { .. } => "payment_completed",
            AuditEvent::PaymentMismatch { .. } => "payment_mismatch",
            AuditEvent::RefundIssued { .. } => "refund_issued",
            AuditEvent::MatchingSweep { .. } => "matching_sweep",
            AuditEvent::UnauthorizedAccess { .. } => "unauthorized_access",
        }
    }

    /// Acting user, if any
    pub fn user_id(&self) -> Option<i64> {
        match self {
            AuditEvent::BidForceCancelled { admin_id, .. }
            | AuditEvent::TradeForceCancelled { admin_id, .. }
            | AuditEvent::MatchingSweep { admin_id, .. } => Some(*admin_id),
            AuditEvent::TradeCancelled { user_id, .. }
            | AuditEvent::PaymentCompleted { user_id, .. }
            | AuditEvent::PaymentMismatch { user_id, .. }
            | AuditEvent::UnauthorizedAccess { user_id, .. } => Some(*user_id),
            AuditEvent::RefundIssued { requested_by, .. } => Some(*requested_by),
            AuditEvent::TradeExpired { .. } => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventRecord {
    pub id: i64,
    pub event_type: String,
    pub actor_id: Option<i64>,
    #[schema(value_type = Object)]
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit logger service
#[derive(Debug, Clone, Default)]
pub struct AuditLogger {
    records: Arc<RwLock<Vec<AuditEventRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an audit event
    pub async fn log(&self, event: AuditEvent) -> AuditEventRecord {
        let event_type = event.event_type();
        let actor_id = event.user_id();
        let event_data = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);

        let record = AuditEventRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            event_type: event_type.to_string(),
            actor_id,
            event_data,
            created_at: Utc::now(),
        };
        self.records.write().await.push(record.clone());

        // Log to application logs as well for immediate visibility
        tracing::info!(
            event_type = event_type,
            actor_id = ?actor_id,
            audit_id = record.id,
            "Audit event logged"
        );

        record
    }

    /// Log event without awaiting
    pub fn log_async(&self, event: AuditEvent) {
        let logger = self.clone();
        tokio::spawn(async move {
            logger.log(event).await;
        });
    }

    /// Most recent records first, optionally filtered by event type
    pub async fn recent(&self, limit: usize, event_type: Option<&str>) -> Vec<AuditEventRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .filter(|r| event_type.map_or(true, |t| r.event_type == t))
            .take(limit.clamp(1, 500))
            .cloned()
            .collect()
    }

    pub async fn get_user_events(&self, user_id: i64, limit: usize) -> Vec<AuditEventRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .filter(|r| r.actor_id == Some(user_id))
            .take(limit)
            .cloned()
            .collect()
    }
}
