//! Order Book
//!
//! Per-option shards of PENDING bids plus the owner-facing bid operations.
//! Every mutation of a bid takes the shard lock of the bid's option first, so
//! amend, withdraw, force-cancel and matching never interleave on one option.

pub mod book;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::MatchingConfig;
use crate::database::repository::{PagedResult, Pagination};
use crate::database::Store;
use crate::error::{ApiError, ErrorCode};
use crate::models::bid::{BidCancelResponse, BidRequest, BidResponse};
use crate::models::{Bid, BidStatus, BidType, CancelReason, NewNotification, NotificationKind, Trade};
use crate::services::catalog::Catalog;
use crate::services::lock::{acquire_with_retry, LockConfig};
use crate::services::matching_engine::MatchingEngine;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::services::penalty::PenaltyRegistry;
use crate::services::rate_limiter::BidRateLimiter;

pub use book::OptionBook;

/// Sharded order book, one async mutex per product option
#[derive(Clone)]
pub struct OrderBook {
    shards: Arc<DashMap<i64, Arc<Mutex<OptionBook>>>>,
    lock_config: LockConfig,
}

impl OrderBook {
    pub fn new(lock_config: LockConfig) -> Self {
        Self {
            shards: Arc::new(DashMap::new()),
            lock_config,
        }
    }

    fn shard(&self, option_id: i64) -> Arc<Mutex<OptionBook>> {
        self.shards
            .entry(option_id)
            .or_insert_with(|| Arc::new(Mutex::new(OptionBook::new(option_id))))
            .clone()
    }

    pub async fn lock(&self, option_id: i64) -> Result<OwnedMutexGuard<OptionBook>, ApiError> {
        let shard = self.shard(option_id);
        acquire_with_retry(&shard, &format!("option:{}", option_id), &self.lock_config).await
    }

    /// Lock two shards in ascending option id order
    pub async fn lock_pair(&self, a: i64, b: i64) -> Result<ShardPair, ApiError> {
        if a == b {
            return Ok(ShardPair {
                first: self.lock(a).await?,
                second: None,
            });
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(low).await?;
        let second = self.lock(high).await?;
        Ok(ShardPair {
            first,
            second: Some(second),
        })
    }

    pub fn option_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.shards.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Two shard guards held together
pub struct ShardPair {
    first: OwnedMutexGuard<OptionBook>,
    second: Option<OwnedMutexGuard<OptionBook>>,
}

impl ShardPair {
    pub fn get_mut(&mut self, option_id: i64) -> Option<&mut OptionBook> {
        if self.first.option_id() == option_id {
            return Some(&mut *self.first);
        }
        match self.second.as_mut() {
            Some(second) if second.option_id() == option_id => Some(&mut **second),
            _ => None,
        }
    }
}

/// Who is closing a bid
#[derive(Debug, Clone)]
pub enum CancelledBy {
    Owner(i64),
    Admin {
        admin_id: i64,
        reason: CancelReason,
        comment: String,
    },
    /// Trade cancellation closing the bid of the cancelling party
    TradeCancelled { trade_id: i64 },
    Expired,
}

#[derive(Clone)]
pub struct OrderBookService {
    store: Store,
    book: OrderBook,
    engine: MatchingEngine,
    penalties: PenaltyRegistry,
    rate_limiter: BidRateLimiter,
    catalog: Catalog,
    notifications: NotificationDispatcher,
    config: MatchingConfig,
}

impl OrderBookService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        book: OrderBook,
        engine: MatchingEngine,
        penalties: PenaltyRegistry,
        rate_limiter: BidRateLimiter,
        catalog: Catalog,
        notifications: NotificationDispatcher,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            book,
            engine,
            penalties,
            rate_limiter,
            catalog,
            notifications,
            config,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    fn validate_request(&self, user_id: i64, request: &BidRequest) -> Result<(), ApiError> {
        if request.price <= 0 {
            return Err(ApiError::with_details(
                ErrorCode::InvalidBidPrice,
                ErrorCode::InvalidBidPrice.message(),
                format!("price: {}", request.price),
            ));
        }
        self.catalog.ensure_option(request.product_option_id)?;
        self.penalties.ensure_can_bid(user_id, Utc::now())
    }

    /// Register a new bid and try to match it
    pub async fn submit(&self, user_id: i64, request: BidRequest) -> Result<BidResponse, ApiError> {
        self.validate_request(user_id, &request)?;
        self.rate_limiter.check(user_id)?;

        let mut book = self.book.lock(request.product_option_id).await?;

        let now = Utc::now();
        let bid = Bid {
            id: self.store.bid_seq.next(),
            user_id,
            product_option_id: request.product_option_id,
            price: request.price,
            bid_type: request.bid_type,
            status: BidStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(self.config.bid_expiry_days),
            cancelled_at: None,
            cancelled_by_admin: false,
            admin_reason: None,
            admin_comment: None,
        };
        self.store.bids.insert(bid.id, bid.clone());
        book.insert(&bid);

        info!(
            bid_id = bid.id,
            user_id = user_id,
            option_id = bid.product_option_id,
            bid_type = %bid.bid_type,
            price = bid.price,
            "Bid registered"
        );
        metrics::counter!("bids_submitted_total", "type" => bid.bid_type.as_str()).increment(1);

        self.notifications.send(NewNotification::new(
            user_id,
            NotificationKind::BidRegistered,
            "Bid registered",
            format!(
                "{} bid for {} at {} registered",
                bid.bid_type,
                self.catalog.option_label(bid.product_option_id),
                bid.price
            ),
        ));

        let trade = self.engine.match_incoming(&mut book, bid.id);
        drop(book);

        self.response_for(bid.id, trade.as_ref())
    }

    /// Change price, option or side of a PENDING bid owned by `user_id`
    pub async fn amend(
        &self,
        user_id: i64,
        bid_id: i64,
        request: BidRequest,
    ) -> Result<BidResponse, ApiError> {
        self.validate_request(user_id, &request)?;

        let current = self
            .store
            .bid(bid_id)
            .ok_or_else(|| ApiError::not_found("Bid"))?;
        if current.user_id != user_id {
            return Err(ApiError::not_owner("bid"));
        }

        let old_option = current.product_option_id;
        let new_option = request.product_option_id;
        let mut shards = self.book.lock_pair(old_option, new_option).await?;

        // re-read under the lock
        let mut bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| ApiError::not_found("Bid"))?;
        if bid.product_option_id != old_option {
            return Err(ApiError::invalid_state(
                "Bid was modified concurrently, please retry",
            ));
        }
        if !bid.is_pending() {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                "Only PENDING bids can be amended",
                format!("status: {}", bid.status),
            ));
        }

        if let Some(old_book) = shards.get_mut(old_option) {
            old_book.remove(bid_id);
        }

        bid.price = request.price;
        bid.product_option_id = new_option;
        bid.bid_type = request.bid_type;
        bid.updated_at = Utc::now();
        self.store.bids.insert(bid_id, bid.clone());

        let trade = match shards.get_mut(new_option) {
            Some(new_book) => {
                new_book.insert(&bid);
                self.engine.match_incoming(new_book, bid_id)
            }
            None => None,
        };
        drop(shards);

        info!(
            bid_id = bid_id,
            user_id = user_id,
            option_id = new_option,
            bid_type = %bid.bid_type,
            price = bid.price,
            "Bid amended"
        );
        self.notifications.send(NewNotification::new(
            user_id,
            NotificationKind::BidUpdated,
            "Bid updated",
            format!(
                "{} bid for {} now at {}",
                bid.bid_type,
                self.catalog.option_label(new_option),
                bid.price
            ),
        ));

        self.response_for(bid_id, trade.as_ref())
    }

    /// Owner withdrawal of a PENDING bid.
    ///
    /// MATCHED bids go through trade cancellation instead.
    pub async fn withdraw(&self, user_id: i64, bid_id: i64) -> Result<BidCancelResponse, ApiError> {
        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| ApiError::not_found("Bid"))?;
        if bid.user_id != user_id {
            return Err(ApiError::not_owner("bid"));
        }
        match bid.status {
            BidStatus::Matched => {
                return Err(ApiError::with_details(
                    ErrorCode::InvalidState,
                    "Bid is already matched; cancelling it cancels the trade and applies a penalty",
                    "Repeat the request with confirmTradeCancel=true to cancel the trade",
                ))
            }
            BidStatus::Cancelled => {
                return Err(ApiError::invalid_state("Bid is already cancelled"))
            }
            BidStatus::Pending => {}
        }

        let cancelled = self
            .cancel_bid(bid_id, CancelledBy::Owner(user_id), BidStatus::Pending)
            .await?;

        Ok(BidCancelResponse {
            bid_id,
            status: cancelled.status,
            message: "Bid cancelled".to_string(),
            cancelled_at: cancelled.cancelled_at,
        })
    }

    /// Lock the shard currently holding `bid_id` and return the bid read under that lock
    async fn lock_bid_shard(
        &self,
        bid_id: i64,
    ) -> Result<(OwnedMutexGuard<OptionBook>, Bid), ApiError> {
        // an amend may move the bid between reading and locking
        for _ in 0..3 {
            let option_id = self
                .store
                .bid(bid_id)
                .ok_or_else(|| ApiError::not_found("Bid"))?
                .product_option_id;
            let guard = self.book.lock(option_id).await?;
            let bid = self
                .store
                .bid(bid_id)
                .ok_or_else(|| ApiError::not_found("Bid"))?;
            if bid.product_option_id == option_id {
                return Ok((guard, bid));
            }
        }
        Err(ApiError::lock_timeout(&format!("bid:{}", bid_id)))
    }

    /// Cancel a bid that is in `expected` status, under its shard lock
    pub async fn cancel_bid(
        &self,
        bid_id: i64,
        by: CancelledBy,
        expected: BidStatus,
    ) -> Result<Bid, ApiError> {
        let (mut book, mut bid) = self.lock_bid_shard(bid_id).await?;
        if bid.status != expected {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                format!("Only {} bids can be cancelled here", expected),
                format!("status: {}", bid.status),
            ));
        }

        let now = Utc::now();
        bid.status = BidStatus::Cancelled;
        bid.cancelled_at = Some(now);
        bid.updated_at = now;
        if let CancelledBy::Admin {
            reason, comment, ..
        } = &by
        {
            bid.cancelled_by_admin = true;
            bid.admin_reason = Some(*reason);
            bid.admin_comment = Some(comment.clone());
        }
        self.store.bids.insert(bid_id, bid.clone());
        book.remove(bid_id);
        drop(book);

        info!(bid_id = bid_id, cancelled_by = ?by, "Bid cancelled");

        let label = self.catalog.option_label(bid.product_option_id);
        let message = match &by {
            CancelledBy::Owner(_) => format!("Your {} bid for {} was cancelled", bid.bid_type, label),
            CancelledBy::Admin { reason, .. } => format!(
                "Your {} bid for {} was cancelled by an administrator: {}",
                bid.bid_type,
                label,
                reason.description()
            ),
            CancelledBy::TradeCancelled { trade_id } => format!(
                "Your {} bid for {} was closed because trade #{} was cancelled",
                bid.bid_type, label, trade_id
            ),
            CancelledBy::Expired => format!("Your {} bid for {} expired", bid.bid_type, label),
        };
        let notification = NewNotification::new(
            bid.user_id,
            NotificationKind::BidCancelled,
            "Bid cancelled",
            message,
        );
        let notification = match &by {
            CancelledBy::TradeCancelled { trade_id } => notification.with_trade(*trade_id),
            _ => notification,
        };
        self.notifications.send(notification);

        Ok(bid)
    }

    /// Put a MATCHED bid back into the book after its trade was cancelled
    pub async fn reinstate(&self, bid_id: i64) -> Result<Option<Trade>, ApiError> {
        let (mut book, mut bid) = self.lock_bid_shard(bid_id).await?;
        if bid.status != BidStatus::Matched {
            return Err(ApiError::invalid_state(format!(
                "Only MATCHED bids can be reinstated (status: {})",
                bid.status
            )));
        }

        bid.status = BidStatus::Pending;
        bid.updated_at = Utc::now();
        self.store.bids.insert(bid_id, bid.clone());
        self.store.active_trade_by_bid.remove(&bid_id);
        book.insert(&bid);

        debug!(bid_id = bid_id, option_id = bid.product_option_id, "Bid reinstated");
        Ok(self.engine.match_incoming(&mut book, bid_id))
    }

    /// PENDING bids of one option, BUY best-first then SELL best-first
    pub fn depth(&self, option_id: i64) -> Result<Vec<BidResponse>, ApiError> {
        self.catalog.ensure_option(option_id)?;

        let pending = self
            .store
            .bids_where(|b| b.product_option_id == option_id && b.is_pending());

        let mut buys: Vec<&Bid> = pending.iter().filter(|b| b.bid_type == BidType::Buy).collect();
        let mut sells: Vec<&Bid> = pending.iter().filter(|b| b.bid_type == BidType::Sell).collect();
        buys.sort_by_key(|b| book::QueueKey::for_bid(b));
        sells.sort_by_key(|b| book::QueueKey::for_bid(b));

        Ok(buys
            .into_iter()
            .chain(sells)
            .map(BidResponse::from)
            .collect())
    }

    pub fn my_bids(&self, user_id: i64, pagination: &Pagination) -> PagedResult<BidResponse> {
        let rows = self.store.bids_where(|b| b.user_id == user_id);
        pagination.apply(rows).map(|b| {
            let mut response = BidResponse::from(&b);
            response.trade_id = self.store.active_trade_by_bid.get(&b.id).map(|t| *t);
            response
        })
    }

    /// Cancel PENDING bids whose expiry has passed
    pub async fn expire_stale(&self, now: chrono::DateTime<Utc>) -> usize {
        let expired = self
            .store
            .bids_where(|b| b.is_pending() && b.expires_at <= now);

        let mut count = 0;
        for bid in expired {
            match self
                .cancel_bid(bid.id, CancelledBy::Expired, BidStatus::Pending)
                .await
            {
                Ok(_) => count += 1,
                Err(e) if e.error_code() == ErrorCode::InvalidState => {}
                Err(e) => warn!(bid_id = bid.id, error = %e, "Failed to expire bid"),
            }
        }
        if count > 0 {
            info!(count = count, "Expired stale bids");
        }
        count
    }

    /// Run matching across every option until no crossing pair remains
    pub async fn match_all_pending(&self) -> Result<Vec<Trade>, ApiError> {
        let mut option_ids = self.book.option_ids();
        option_ids.extend(self.catalog.option_ids());
        option_ids.sort_unstable();
        option_ids.dedup();

        let mut trades = Vec::new();
        for option_id in option_ids {
            let mut book = self.book.lock(option_id).await?;
            trades.extend(self.engine.sweep(&mut book));
        }
        if !trades.is_empty() {
            info!(trades = trades.len(), "Matching sweep created trades");
        }
        Ok(trades)
    }

    fn response_for(&self, bid_id: i64, trade: Option<&Trade>) -> Result<BidResponse, ApiError> {
        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| ApiError::not_found("Bid"))?;
        let mut response = BidResponse::from(&bid);
        response.trade_id = trade.map(|t| t.id);
        Ok(response)
    }
}
