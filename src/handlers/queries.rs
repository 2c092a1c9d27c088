//! Shared query parameter types for handler endpoints.
//!
//! Filters arrive as loose strings and are parsed into typed service filters
//! here, so an unknown status or type is reported as a validation error.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::constants::{audit, pagination};
use crate::database::Pagination;
use crate::error::Result;
use crate::models::admin::{BidMonitorFilter, TradeMonitorFilter};

/// `page`/`size` pagination used by the "me" list endpoints
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Zero-based page index (default: 0)
    #[serde(default = "default_page")]
    pub page: u32,

    /// Items per page (default: 10, max: 100)
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_page() -> u32 {
    pagination::DEFAULT_PAGE
}

fn default_size() -> u32 {
    pagination::DEFAULT_PAGE_SIZE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: pagination::DEFAULT_PAGE,
            size: pagination::DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationParams {
    pub fn to_pagination(&self) -> Pagination {
        Pagination::new(self.page, self.size.min(pagination::MAX_PAGE_SIZE))
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DepthQuery {
    pub product_option_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct WithdrawQuery {
    /// Required to withdraw a MATCHED bid, which cancels its trade
    #[serde(default)]
    pub confirm_trade_cancel: bool,
}

/// Notification listing; `afterId` switches to cursor mode
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    pub after_id: Option<i64>,
    pub limit: Option<usize>,
}

impl NotificationQuery {
    pub fn cursor_limit(&self) -> usize {
        self.limit
            .unwrap_or(pagination::DEFAULT_PAGE_SIZE as usize)
            .clamp(1, pagination::MAX_CURSOR_LIMIT)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AdminBidQuery {
    #[serde(default)]
    pub page: u32,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub bid_type: Option<String>,
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl AdminBidQuery {
    pub fn to_filter(&self) -> Result<BidMonitorFilter> {
        Ok(BidMonitorFilter {
            status: non_blank(&self.status).map(str::parse).transpose()?,
            bid_type: non_blank(&self.bid_type).map(str::parse).transpose()?,
            product_id: self.product_id,
            category_id: self.category_id,
            user_id: self.user_id,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AdminTradeQuery {
    #[serde(default)]
    pub page: u32,
    pub status: Option<String>,
    pub user_id: Option<i64>,
}

impl AdminTradeQuery {
    pub fn to_filter(&self) -> Result<TradeMonitorFilter> {
        Ok(TradeMonitorFilter {
            status: non_blank(&self.status).map(str::parse).transpose()?,
            user_id: self.user_id,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(audit::DEFAULT_LIMIT)
            .clamp(1, audit::MAX_LIMIT)
    }
}

/// Treat `?status=` the same as an absent parameter
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::{BidStatus, BidType, TradeStatus};

    #[test]
    fn test_pagination_defaults_and_cap() {
        let params = PaginationParams::default();
        assert_eq!(params.to_pagination(), Pagination::new(0, 10));

        let big = PaginationParams { page: 2, size: 5000 };
        assert_eq!(big.to_pagination().per_page, 100);
    }

    #[test]
    fn test_admin_bid_filter_parsing() {
        let query = AdminBidQuery {
            status: Some("pending".to_string()),
            bid_type: Some("SELL".to_string()),
            product_id: Some(1),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.status, Some(BidStatus::Pending));
        assert_eq!(filter.bid_type, Some(BidType::Sell));
        assert_eq!(filter.product_id, Some(1));
    }

    #[test]
    fn test_blank_filter_is_ignored_and_unknown_rejected() {
        let blank = AdminTradeQuery {
            status: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank.to_filter().unwrap().status.is_none());

        let bad = AdminTradeQuery {
            status: Some("SHIPPED".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.to_filter().unwrap_err().error_code(), ErrorCode::InvalidInput);

        let ok = AdminTradeQuery {
            status: Some("payment_canceled".to_string()),
            ..Default::default()
        };
        assert_eq!(ok.to_filter().unwrap().status, Some(TradeStatus::PaymentCanceled));
    }

    #[test]
    fn test_audit_limit_bounds() {
        assert_eq!(AuditQuery::default().limit(), 50);
        let huge = AuditQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(huge.limit(), 500);
    }
}
