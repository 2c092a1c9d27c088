//! Notification Models
//!
//! Data structures for the notification log and its pull/push read paths

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Type of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BidRegistered,
    BidUpdated,
    BidCancelled,
    TradeMatched,
    TradeCancelled,
    PaymentCompleted,
    SettlementCompleted,
    RefundCompleted,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::BidRegistered => write!(f, "BID_REGISTERED"),
            NotificationKind::BidUpdated => write!(f, "BID_UPDATED"),
            NotificationKind::BidCancelled => write!(f, "BID_CANCELLED"),
            NotificationKind::TradeMatched => write!(f, "TRADE_MATCHED"),
            NotificationKind::TradeCancelled => write!(f, "TRADE_CANCELLED"),
            NotificationKind::PaymentCompleted => write!(f, "PAYMENT_COMPLETED"),
            NotificationKind::SettlementCompleted => write!(f, "SETTLEMENT_COMPLETED"),
            NotificationKind::RefundCompleted => write!(f, "REFUND_COMPLETED"),
        }
    }
}

/// A notification record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub trade_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    /// Set once the notification reached a live stream
    #[serde(skip_serializing)]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Input for the dispatcher
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub trade_id: Option<i64>,
    pub title: String,
    pub message: String,
}

impl NewNotification {
    pub fn new(
        user_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            trade_id: None,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn with_trade(mut self, trade_id: i64) -> Self {
        self.trade_id = Some(trade_id);
        self
    }
}

/// Cursor-mode page, oldest first
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCursorPage {
    pub items: Vec<Notification>,
    pub next_cursor: Option<i64>,
    pub has_next: bool,
}
