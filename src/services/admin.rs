//! Admin Override Layer
//!
//! Privileged cancellation that bypasses ownership, plus read-only monitoring
//! queries. Monitoring reads store snapshots and never takes a shard lock.

use tracing::warn;

use crate::database::repository::{PagedResult, Pagination};
use crate::database::Store;
use crate::error::ApiError;
use crate::models::admin::{
    AdminBidCancelResponse, AdminCancelRequest, BidMonitorFilter, BidMonitorRow, SweepResponse,
    TradeMonitorFilter, TradeMonitorRow,
};
use crate::models::trade::TradeCancelResponse;
use crate::models::{Bid, BidStatus, CancelReason, Trade};
use crate::services::audit_logger::{AuditEvent, AuditEventRecord, AuditLogger};
use crate::services::catalog::Catalog;
use crate::services::order_book::{CancelledBy, OrderBookService};
use crate::services::trade_lifecycle::TradeLifecycle;

const MAX_COMMENT_CHARS: usize = 500;

#[derive(Clone)]
pub struct AdminService {
    store: Store,
    catalog: Catalog,
    order_book: OrderBookService,
    trades: TradeLifecycle,
    audit: AuditLogger,
    page_size: u32,
}

/// Reason code and trimmed comment of a force-cancel request
fn parse_override(request: &AdminCancelRequest) -> Result<(CancelReason, String), ApiError> {
    let reason: CancelReason = request.reason_code.parse()?;
    let comment = request.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::validation_field("comment", "comment is required"));
    }
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::validation_field(
            "comment",
            "comment must be at most 500 characters",
        ));
    }
    Ok((reason, comment.to_string()))
}

impl AdminService {
    pub fn new(
        store: Store,
        catalog: Catalog,
        order_book: OrderBookService,
        trades: TradeLifecycle,
        audit: AuditLogger,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            order_book,
            trades,
            audit,
            page_size: page_size.clamp(1, 100) as u32,
        }
    }

    /// Cancel a PENDING bid on behalf of the marketplace. No penalty is applied.
    pub async fn force_cancel_bid(
        &self,
        admin_id: i64,
        bid_id: i64,
        request: AdminCancelRequest,
    ) -> Result<AdminBidCancelResponse, ApiError> {
        let (reason, comment) = parse_override(&request)?;

        let bid = self
            .order_book
            .cancel_bid(
                bid_id,
                CancelledBy::Admin {
                    admin_id,
                    reason,
                    comment: comment.clone(),
                },
                BidStatus::Pending,
            )
            .await?;

        warn!(
            bid_id = bid_id,
            admin_id = admin_id,
            owner_id = bid.user_id,
            reason = %reason,
            "Bid force-cancelled by admin"
        );
        self.audit
            .log(AuditEvent::BidForceCancelled {
                admin_id,
                bid_id,
                owner_id: bid.user_id,
                reason_code: reason.to_string(),
                comment,
            })
            .await;

        Ok(AdminBidCancelResponse {
            bid_id,
            status: bid.status,
            cancelled_by: admin_id,
            cancelled_at: bid.cancelled_at,
            reason,
        })
    }

    pub async fn force_cancel_trade(
        &self,
        admin_id: i64,
        trade_id: i64,
        request: AdminCancelRequest,
    ) -> Result<TradeCancelResponse, ApiError> {
        let (reason, comment) = parse_override(&request)?;
        self.trades
            .admin_cancel(trade_id, admin_id, reason, comment)
            .await
    }

    pub fn monitor_bids(&self, filter: &BidMonitorFilter, page: u32) -> PagedResult<BidMonitorRow> {
        let rows = self.store.bids_where(|bid| self.bid_matches(bid, filter));
        Pagination::new(page, self.page_size)
            .apply(rows)
            .map(|bid| self.bid_row(&bid))
    }

    fn bid_matches(&self, bid: &Bid, filter: &BidMonitorFilter) -> bool {
        if filter.status.is_some_and(|s| s != bid.status)
            || filter.bid_type.is_some_and(|t| t != bid.bid_type)
            || filter.user_id.is_some_and(|u| u != bid.user_id)
        {
            return false;
        }
        if filter.product_id.is_none() && filter.category_id.is_none() {
            return true;
        }
        match self.catalog.option_details(bid.product_option_id) {
            Some(details) => {
                filter.product_id.map_or(true, |p| p == details.product.id)
                    && filter.category_id.map_or(true, |c| c == details.category.id)
            }
            None => false,
        }
    }

    fn bid_row(&self, bid: &Bid) -> BidMonitorRow {
        let details = self.catalog.option_details(bid.product_option_id);
        BidMonitorRow {
            bid_id: bid.id,
            user_id: bid.user_id,
            user_name: self.catalog.user_name(bid.user_id),
            product_id: details.as_ref().map(|d| d.product.id).unwrap_or_default(),
            product_name: details
                .as_ref()
                .map(|d| d.product.name.clone())
                .unwrap_or_default(),
            category_id: details.as_ref().map(|d| d.category.id).unwrap_or_default(),
            category_name: details
                .as_ref()
                .map(|d| d.category.name.clone())
                .unwrap_or_default(),
            price: bid.price,
            bid_type: bid.bid_type,
            status: bid.status,
            created_at: bid.created_at,
        }
    }

    pub fn monitor_trades(
        &self,
        filter: &TradeMonitorFilter,
        page: u32,
    ) -> PagedResult<TradeMonitorRow> {
        let rows = self.store.trades_where(|t| {
            filter.status.map_or(true, |s| s == t.status)
                && filter.user_id.map_or(true, |u| t.is_party(u))
        });
        Pagination::new(page, self.page_size)
            .apply(rows)
            .map(|t| self.trade_row(&t))
    }

    fn trade_row(&self, trade: &Trade) -> TradeMonitorRow {
        TradeMonitorRow {
            trade_id: trade.id,
            product_name: self
                .catalog
                .option_details(trade.product_option_id)
                .map(|d| d.product.name)
                .unwrap_or_default(),
            price: trade.price,
            status: trade.status,
            seller_name: self.catalog.user_name(trade.seller_id),
            buyer_name: self.catalog.user_name(trade.buyer_id),
            created_at: trade.matched_at,
        }
    }

    /// Run matching over every option book
    pub async fn rematch(&self, admin_id: i64) -> Result<SweepResponse, ApiError> {
        let trades = self.order_book.match_all_pending().await?;
        self.audit
            .log(AuditEvent::MatchingSweep {
                admin_id,
                trades_created: trades.len(),
            })
            .await;
        Ok(SweepResponse {
            trades_created: trades.len(),
            trade_ids: trades.iter().map(|t| t.id).collect(),
        })
    }

    pub async fn audit_log(&self, event_type: Option<&str>, limit: usize) -> Vec<AuditEventRecord> {
        self.audit.recent(limit, event_type).await
    }
}
