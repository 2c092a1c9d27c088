//! Trade Lifecycle
//!
//! `WAITING_PAYMENT -> PAYMENT_COMPLETED` on verified payment, or
//! `WAITING_PAYMENT -> PAYMENT_CANCELED` on cancellation by a party, payment
//! timeout or administrator. Every transition runs under the `trade:{id}` lock;
//! bid changes made while closing a trade take the option shard lock after it.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::TradeConfig;
use crate::database::repository::{PagedResult, Pagination};
use crate::database::Store;
use crate::error::{ApiError, ErrorCode};
use crate::models::trade::{TradeCancelResponse, TradeResponse};
use crate::models::{
    BidStatus, CancelReason, NewNotification, NotificationKind, PaymentHistory, PaymentStatus,
    Trade, TradeRole, TradeStatus,
};
use crate::services::audit_logger::{AuditEvent, AuditLogger};
use crate::services::catalog::Catalog;
use crate::services::lock::KeyedLocks;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::services::order_book::{CancelledBy, OrderBookService};
use crate::services::penalty::PenaltyRegistry;

pub const REASON_BUYER_CANCELLED: &str = "BUYER_CANCELLED";
pub const REASON_SELLER_CANCELLED: &str = "SELLER_CANCELLED";
pub const REASON_PAYMENT_TIMEOUT: &str = "PAYMENT_TIMEOUT";

#[derive(Clone)]
pub struct TradeLifecycle {
    store: Store,
    order_book: OrderBookService,
    penalties: PenaltyRegistry,
    notifications: NotificationDispatcher,
    audit: AuditLogger,
    locks: KeyedLocks,
    catalog: Catalog,
    config: TradeConfig,
}

impl TradeLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        order_book: OrderBookService,
        penalties: PenaltyRegistry,
        notifications: NotificationDispatcher,
        audit: AuditLogger,
        locks: KeyedLocks,
        catalog: Catalog,
        config: TradeConfig,
    ) -> Self {
        Self {
            store,
            order_book,
            penalties,
            notifications,
            audit,
            locks,
            catalog,
            config,
        }
    }

    /// Cancel a trade awaiting payment on behalf of one of its parties.
    ///
    /// The canceller's bid is closed and the canceller is penalised; the
    /// counter-party's bid goes back into the book.
    pub async fn cancel(&self, trade_id: i64, user_id: i64) -> Result<TradeCancelResponse, ApiError> {
        let _guard = self.locks.acquire_trade(trade_id).await?;

        let trade = self
            .store
            .trade(trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        let role = trade.role_of(user_id).ok_or_else(|| ApiError::not_owner("trade"))?;
        if !trade.is_waiting_payment() {
            return Err(ApiError::with_details(
                ErrorCode::TradeNotCancellable,
                ErrorCode::TradeNotCancellable.message(),
                format!("status: {}", trade.status),
            ));
        }

        let reason = match role {
            TradeRole::Buyer => REASON_BUYER_CANCELLED,
            TradeRole::Seller => REASON_SELLER_CANCELLED,
        };
        let (trade, penalty_until) = self.close_by_party(trade, user_id, reason).await?;

        self.audit
            .log(AuditEvent::TradeCancelled {
                user_id,
                trade_id,
                penalty_until,
            })
            .await;

        Ok(TradeCancelResponse {
            trade_id,
            status: trade.status,
            message: format!(
                "Trade cancelled. New bids are blocked until {}",
                penalty_until.to_rfc3339()
            ),
            penalty_until: Some(penalty_until),
        })
    }

    /// Cancel the trade a MATCHED bid belongs to
    pub async fn cancel_for_bid(
        &self,
        bid_id: i64,
        user_id: i64,
    ) -> Result<TradeCancelResponse, ApiError> {
        let bid = self
            .store
            .bid(bid_id)
            .ok_or_else(|| ApiError::not_found("Bid"))?;
        if bid.user_id != user_id {
            return Err(ApiError::not_owner("bid"));
        }
        if bid.status != BidStatus::Matched {
            return Err(ApiError::invalid_state(format!(
                "Bid is {}, not MATCHED",
                bid.status
            )));
        }
        let trade_id = self
            .store
            .active_trade_by_bid
            .get(&bid_id)
            .map(|t| *t)
            .ok_or_else(|| ApiError::invalid_state("Bid has no active trade"))?;

        self.cancel(trade_id, user_id).await
    }

    /// Close `trade` on behalf of `closing_user`. Caller holds the trade lock.
    async fn close_by_party(
        &self,
        mut trade: Trade,
        closing_user: i64,
        reason: &str,
    ) -> Result<(Trade, DateTime<Utc>), ApiError> {
        let (own_bid, other_bid) = trade
            .bids_for(closing_user)
            .ok_or_else(|| ApiError::not_owner("trade"))?;

        self.order_book
            .cancel_bid(
                own_bid,
                CancelledBy::TradeCancelled { trade_id: trade.id },
                BidStatus::Matched,
            )
            .await?;

        let now = Utc::now();
        trade.status = TradeStatus::PaymentCanceled;
        trade.cancelled_at = Some(now);
        trade.cancelled_by = Some(closing_user);
        trade.cancel_reason = Some(reason.to_string());
        self.store.trades.insert(trade.id, trade.clone());
        self.store.active_trade_by_bid.remove(&own_bid);
        self.fail_open_payment(trade.id, now);

        let penalty = self.penalties.apply(closing_user, Some(trade.id), reason, now);

        match self.order_book.reinstate(other_bid).await {
            Ok(Some(rematched)) => info!(
                bid_id = other_bid,
                trade_id = rematched.id,
                "Reinstated bid matched again"
            ),
            Ok(None) => {}
            Err(e) => warn!(bid_id = other_bid, error = %e, "Failed to reinstate counter-party bid"),
        }

        info!(
            trade_id = trade.id,
            cancelled_by = closing_user,
            reason = reason,
            "Trade cancelled"
        );
        metrics::counter!("trades_cancelled_total", "reason" => reason.to_string()).increment(1);

        let label = self.catalog.option_label(trade.product_option_id);
        let counterparty = trade.counterparty_of(closing_user).unwrap_or(closing_user);
        self.notifications.send_all(vec![
            NewNotification::new(
                closing_user,
                NotificationKind::TradeCancelled,
                "Trade cancelled",
                format!(
                    "Trade #{} for {} was cancelled. Bidding is paused until {}",
                    trade.id,
                    label,
                    penalty.expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
            )
            .with_trade(trade.id),
            NewNotification::new(
                counterparty,
                NotificationKind::TradeCancelled,
                "Trade cancelled",
                format!(
                    "Trade #{} for {} was cancelled by the other party. Your bid is back on the market",
                    trade.id, label
                ),
            )
            .with_trade(trade.id),
        ]);

        Ok((trade, penalty.expires_at))
    }

    /// A prepared payment of a cancelled trade can no longer be completed
    fn fail_open_payment(&self, trade_id: i64, now: DateTime<Utc>) {
        let Some(payment_id) = self.store.payment_by_trade.get(&trade_id).map(|p| *p) else {
            return;
        };
        let Some(mut payment) = self.store.payments.get_mut(&payment_id) else {
            return;
        };
        if payment.status != PaymentStatus::Prepared {
            return;
        }
        payment.status = PaymentStatus::Failed;
        let amount = payment.amount;
        drop(payment);

        self.store.append_payment_history(PaymentHistory {
            payment_id,
            previous_status: Some(PaymentStatus::Prepared),
            new_status: PaymentStatus::Failed,
            amount,
            at: now,
        });
    }

    /// Cancel trades whose buyer did not pay within the payment window
    pub async fn expire_unpaid(&self, now: DateTime<Utc>) -> usize {
        let deadline = now - Duration::minutes(self.config.payment_window_minutes);
        let overdue = self
            .store
            .trades_where(|t| t.is_waiting_payment() && t.matched_at <= deadline);

        let mut expired = 0;
        for candidate in overdue {
            match self.expire_one(candidate.id, deadline).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!(trade_id = candidate.id, error = %e, "Failed to expire unpaid trade"),
            }
        }
        if expired > 0 {
            info!(count = expired, "Expired unpaid trades");
        }
        expired
    }

    async fn expire_one(&self, trade_id: i64, deadline: DateTime<Utc>) -> Result<bool, ApiError> {
        let _guard = self.locks.acquire_trade(trade_id).await?;
        let trade = match self.store.trade(trade_id) {
            Some(t) if t.is_waiting_payment() && t.matched_at <= deadline => t,
            _ => return Ok(false),
        };
        // paid but not yet recorded as completed
        if self
            .store
            .payment_for_trade(trade_id)
            .is_some_and(|p| p.status == PaymentStatus::Paid)
        {
            return Ok(false);
        }

        let buyer_id = trade.buyer_id;
        self.close_by_party(trade, buyer_id, REASON_PAYMENT_TIMEOUT)
            .await?;
        self.audit
            .log(AuditEvent::TradeExpired { trade_id, buyer_id })
            .await;
        Ok(true)
    }

    /// Administrative cancellation: both bids are closed and nobody is penalised
    pub async fn admin_cancel(
        &self,
        trade_id: i64,
        admin_id: i64,
        reason: CancelReason,
        comment: String,
    ) -> Result<TradeCancelResponse, ApiError> {
        let _guard = self.locks.acquire_trade(trade_id).await?;

        let mut trade = self
            .store
            .trade(trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        if !trade.is_waiting_payment() {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                "Only trades awaiting payment can be force-cancelled",
                format!("status: {}", trade.status),
            ));
        }

        for bid_id in [trade.buy_bid_id, trade.sell_bid_id] {
            self.order_book
                .cancel_bid(
                    bid_id,
                    CancelledBy::Admin {
                        admin_id,
                        reason,
                        comment: comment.clone(),
                    },
                    BidStatus::Matched,
                )
                .await?;
            self.store.active_trade_by_bid.remove(&bid_id);
        }

        let now = Utc::now();
        trade.status = TradeStatus::PaymentCanceled;
        trade.cancelled_at = Some(now);
        trade.cancelled_by = Some(admin_id);
        trade.cancel_reason = Some(format!("ADMIN:{}", reason));
        self.store.trades.insert(trade_id, trade.clone());
        self.fail_open_payment(trade_id, now);

        warn!(
            trade_id = trade_id,
            admin_id = admin_id,
            reason = %reason,
            "Trade force-cancelled by admin"
        );
        metrics::counter!("trades_cancelled_total", "reason" => "ADMIN").increment(1);

        let label = self.catalog.option_label(trade.product_option_id);
        let message = format!(
            "Trade #{} for {} was cancelled by an administrator: {}",
            trade_id,
            label,
            reason.description()
        );
        self.notifications.send_all(
            [trade.buyer_id, trade.seller_id]
                .into_iter()
                .map(|user| {
                    NewNotification::new(
                        user,
                        NotificationKind::TradeCancelled,
                        "Trade cancelled",
                        message.clone(),
                    )
                    .with_trade(trade_id)
                })
                .collect(),
        );

        self.audit
            .log(AuditEvent::TradeForceCancelled {
                admin_id,
                trade_id,
                reason_code: reason.to_string(),
                comment,
            })
            .await;

        Ok(TradeCancelResponse {
            trade_id,
            status: trade.status,
            message: "Trade cancelled by administrator".to_string(),
            penalty_until: None,
        })
    }

    /// Mark a trade paid. Caller holds the trade lock.
    pub fn complete_locked(&self, trade_id: i64) -> Result<Trade, ApiError> {
        let mut trade = self
            .store
            .trade(trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        if !trade.is_waiting_payment() {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                "Trade is not awaiting payment",
                format!("status: {}", trade.status),
            ));
        }

        trade.status = TradeStatus::PaymentCompleted;
        trade.completed_at = Some(Utc::now());
        self.store.trades.insert(trade_id, trade.clone());

        info!(trade_id = trade_id, price = trade.price, "Trade payment completed");

        let label = self.catalog.option_label(trade.product_option_id);
        self.notifications.send_all(vec![
            NewNotification::new(
                trade.buyer_id,
                NotificationKind::PaymentCompleted,
                "Payment completed",
                format!("Your payment of {} for {} is complete", trade.price, label),
            )
            .with_trade(trade_id),
            NewNotification::new(
                trade.seller_id,
                NotificationKind::PaymentCompleted,
                "Buyer paid",
                format!("The buyer paid {} for {}. Please ship the item", trade.price, label),
            )
            .with_trade(trade_id),
        ]);

        Ok(trade)
    }

    pub fn get(&self, trade_id: i64, user_id: i64) -> Result<TradeResponse, ApiError> {
        let trade = self
            .store
            .trade(trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        let role = trade.role_of(user_id).ok_or_else(|| ApiError::not_owner("trade"))?;
        Ok(self.to_response(&trade, role))
    }

    pub fn my_trades(&self, user_id: i64, pagination: &Pagination) -> PagedResult<TradeResponse> {
        let rows = self.store.trades_where(|t| t.is_party(user_id));
        pagination.apply(rows).map(|t| {
            let role = t.role_of(user_id).unwrap_or(TradeRole::Buyer);
            self.to_response(&t, role)
        })
    }

    fn to_response(&self, trade: &Trade, role: TradeRole) -> TradeResponse {
        let (product_name, size) = match self.catalog.option_details(trade.product_option_id) {
            Some(details) => (details.product.name, details.option.size),
            None => (String::new(), String::new()),
        };
        TradeResponse {
            id: trade.id,
            product_option_id: trade.product_option_id,
            product_name,
            size,
            price: trade.price,
            status: trade.status,
            matched_at: trade.matched_at,
            role,
        }
    }
}
