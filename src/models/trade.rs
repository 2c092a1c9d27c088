use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    WaitingPayment,
    PaymentCompleted,
    PaymentCanceled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::WaitingPayment => "WAITING_PAYMENT",
            TradeStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            TradeStatus::PaymentCanceled => "PAYMENT_CANCELED",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WAITING_PAYMENT" => Ok(TradeStatus::WaitingPayment),
            "PAYMENT_COMPLETED" => Ok(TradeStatus::PaymentCompleted),
            "PAYMENT_CANCELED" | "PAYMENT_CANCELLED" => Ok(TradeStatus::PaymentCanceled),
            other => Err(ApiError::validation_field(
                "status",
                format!("Unknown trade status: {}", other),
            )),
        }
    }
}

/// Which side of a trade a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeRole {
    Buyer,
    Seller,
}

/// Pairing of one BUY and one SELL bid at the resting bid's price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub buy_bid_id: i64,
    pub sell_bid_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub product_option_id: i64,
    pub price: i64,
    pub status: TradeStatus,
    pub matched_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<i64>,
    pub cancel_reason: Option<String>,
}

impl Trade {
    pub fn is_waiting_payment(&self) -> bool {
        self.status == TradeStatus::WaitingPayment
    }

    pub fn role_of(&self, user_id: i64) -> Option<TradeRole> {
        if user_id == self.buyer_id {
            Some(TradeRole::Buyer)
        } else if user_id == self.seller_id {
            Some(TradeRole::Seller)
        } else {
            None
        }
    }

    pub fn is_party(&self, user_id: i64) -> bool {
        self.role_of(user_id).is_some()
    }

    /// Bid owned by `user_id` and the counter-party's bid
    pub fn bids_for(&self, user_id: i64) -> Option<(i64, i64)> {
        match self.role_of(user_id)? {
            TradeRole::Buyer => Some((self.buy_bid_id, self.sell_bid_id)),
            TradeRole::Seller => Some((self.sell_bid_id, self.buy_bid_id)),
        }
    }

    pub fn counterparty_of(&self, user_id: i64) -> Option<i64> {
        match self.role_of(user_id)? {
            TradeRole::Buyer => Some(self.seller_id),
            TradeRole::Seller => Some(self.buyer_id),
        }
    }
}

/// Trade as seen by one of its parties
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub id: i64,
    pub product_option_id: i64,
    pub product_name: String,
    pub size: String,
    pub price: i64,
    pub status: TradeStatus,
    pub matched_at: DateTime<Utc>,
    pub role: TradeRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TradeCancelResponse {
    pub trade_id: i64,
    pub status: TradeStatus,
    pub message: String,
    pub penalty_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade() -> Trade {
        Trade {
            id: 1,
            buy_bid_id: 10,
            sell_bid_id: 20,
            buyer_id: 100,
            seller_id: 200,
            product_option_id: 3,
            price: 480_000,
            status: TradeStatus::WaitingPayment,
            matched_at: Utc::now(),
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }

    #[test]
    fn test_roles_and_counterparty() {
        let t = trade();
        assert_eq!(t.role_of(100), Some(TradeRole::Buyer));
        assert_eq!(t.role_of(200), Some(TradeRole::Seller));
        assert_eq!(t.role_of(300), None);
        assert_eq!(t.bids_for(200), Some((20, 10)));
        assert_eq!(t.counterparty_of(100), Some(200));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TradeStatus::PaymentCanceled).unwrap(),
            "\"PAYMENT_CANCELED\""
        );
        assert_eq!(
            "waiting_payment".parse::<TradeStatus>().unwrap(),
            TradeStatus::WaitingPayment
        );
    }
}
