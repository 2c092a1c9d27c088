//! Admin override and monitoring shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::bid::{BidStatus, BidType, CancelReason};
use crate::models::trade::TradeStatus;

/// Body of a force-cancel request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminCancelRequest {
    /// One of FRAUD, OUT_OF_STOCK, MISTAKE, POLICY_VIOLATION, OTHER
    pub reason_code: String,
    #[validate(length(max = 500, message = "comment must be at most 500 characters"))]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminBidCancelResponse {
    pub bid_id: i64,
    pub status: BidStatus,
    /// Admin user id
    pub cancelled_by: i64,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub reason: CancelReason,
}

/// Bid monitoring filters; every field is optional
#[derive(Debug, Clone, Default)]
pub struct BidMonitorFilter {
    pub status: Option<BidStatus>,
    pub bid_type: Option<BidType>,
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BidMonitorRow {
    pub bid_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub product_id: i64,
    pub product_name: String,
    pub category_id: i64,
    pub category_name: String,
    pub price: i64,
    #[serde(rename = "type")]
    pub bid_type: BidType,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TradeMonitorFilter {
    pub status: Option<TradeStatus>,
    /// Matches either party
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TradeMonitorRow {
    pub trade_id: i64,
    pub product_name: String,
    pub price: i64,
    pub status: TradeStatus,
    pub seller_name: String,
    pub buyer_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub trades_created: usize,
    pub trade_ids: Vec<i64>,
}
