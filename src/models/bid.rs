//! Bid Models
//!
//! Standing BUY/SELL offers on a product option and their request/response shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{ApiError, ErrorCode};

/// Side of a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidType {
    Buy,
    Sell,
}

impl BidType {
    pub fn opposite(&self) -> Self {
        match self {
            BidType::Buy => BidType::Sell,
            BidType::Sell => BidType::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BidType::Buy => "BUY",
            BidType::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for BidType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(BidType::Buy),
            "SELL" => Ok(BidType::Sell),
            other => Err(ApiError::validation_field(
                "type",
                format!("Unknown bid type: {}", other),
            )),
        }
    }
}

/// Lifecycle status of a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    Pending,
    Matched,
    Cancelled,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "PENDING",
            BidStatus::Matched => "MATCHED",
            BidStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BidStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(BidStatus::Pending),
            "MATCHED" => Ok(BidStatus::Matched),
            "CANCELLED" | "CANCELED" => Ok(BidStatus::Cancelled),
            other => Err(ApiError::validation_field(
                "status",
                format!("Unknown bid status: {}", other),
            )),
        }
    }
}

/// Reason codes accepted for administrative cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    Fraud,
    OutOfStock,
    Mistake,
    PolicyViolation,
    Other,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Fraud => "FRAUD",
            CancelReason::OutOfStock => "OUT_OF_STOCK",
            CancelReason::Mistake => "MISTAKE",
            CancelReason::PolicyViolation => "POLICY_VIOLATION",
            CancelReason::Other => "OTHER",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CancelReason::Fraud => "Suspected fraudulent activity",
            CancelReason::OutOfStock => "Item is out of stock",
            CancelReason::Mistake => "Bid was registered by mistake",
            CancelReason::PolicyViolation => "Marketplace policy violation",
            CancelReason::Other => "Other administrative reason",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancelReason {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FRAUD" => Ok(CancelReason::Fraud),
            "OUT_OF_STOCK" => Ok(CancelReason::OutOfStock),
            "MISTAKE" => Ok(CancelReason::Mistake),
            "POLICY_VIOLATION" => Ok(CancelReason::PolicyViolation),
            "OTHER" => Ok(CancelReason::Other),
            other => Err(ApiError::with_details(
                ErrorCode::InvalidReasonCode,
                ErrorCode::InvalidReasonCode.message(),
                format!("reasonCode: {}", other),
            )),
        }
    }
}

/// A standing offer to buy or sell one unit of a product option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub user_id: i64,
    pub product_option_id: i64,
    /// Integer currency units
    pub price: i64,
    pub bid_type: BidType,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by_admin: bool,
    pub admin_reason: Option<CancelReason>,
    pub admin_comment: Option<String>,
}

impl Bid {
    pub fn is_pending(&self) -> bool {
        self.status == BidStatus::Pending
    }

    /// Whether a resting counter-bid at `counter_price` crosses this bid
    pub fn crosses(&self, counter_price: i64) -> bool {
        match self.bid_type {
            BidType::Buy => counter_price <= self.price,
            BidType::Sell => counter_price >= self.price,
        }
    }
}

/// Request body for registering or amending a bid
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    #[validate(range(min = 1, message = "productOptionId must be a positive id"))]
    pub product_option_id: i64,
    pub price: i64,
    #[serde(rename = "type")]
    pub bid_type: BidType,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BidResponse {
    pub id: i64,
    pub user_id: i64,
    pub product_option_id: i64,
    pub price: i64,
    #[serde(rename = "type")]
    pub bid_type: BidType,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Trade created by this request, when the bid matched immediately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<i64>,
}

impl From<&Bid> for BidResponse {
    fn from(bid: &Bid) -> Self {
        Self {
            id: bid.id,
            user_id: bid.user_id,
            product_option_id: bid.product_option_id,
            price: bid.price,
            bid_type: bid.bid_type,
            status: bid.status,
            created_at: bid.created_at,
            expires_at: bid.expires_at,
            trade_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BidCancelResponse {
    pub bid_id: i64,
    pub status: BidStatus,
    pub message: String,
    pub cancelled_at: Option<DateTime<Utc>>,
}
