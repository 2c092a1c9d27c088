pub mod types;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::Actor;
use crate::database::repository::{PagedResult, Pagination};
use crate::database::Store;
use crate::error::{ApiError, ErrorCode};
use crate::models::payment::RefundResponse;
use crate::models::{
    NewNotification, NotificationKind, Payment, PaymentHistory, PaymentStatus, Refund, Settlement,
    SettlementStatus, Trade,
};
use crate::services::audit_logger::{AuditEvent, AuditLogger};
use crate::services::lock::KeyedLocks;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::services::payment::gateway::{with_retry, PaymentGateway};

pub use types::*;

/// Seller payouts and refunds for paid trades
#[derive(Clone)]
pub struct SettlementService {
    store: Store,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationDispatcher,
    audit: AuditLogger,
    locks: KeyedLocks,
    config: SettlementConfig,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationDispatcher,
        audit: AuditLogger,
        locks: KeyedLocks,
        config: SettlementConfig,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            notifications,
            audit,
            locks,
            config,
            retry_attempts,
            retry_delay,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Create the settlement of a paid trade.
    ///
    /// Calling this again for the same trade returns the existing record.
    pub fn create_for(&self, trade: &Trade, payment: &Payment) -> Settlement {
        match self.store.settlement_by_trade.entry(trade.id) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                drop(existing);
                debug!(trade_id = trade.id, settlement_id = id, "Settlement already exists");
                // the index is only written after the row
                self.store.settlement(id).unwrap_or_else(|| self.build(id, trade, payment))
            }
            Entry::Vacant(slot) => {
                let id = self.store.settlement_seq.next();
                let settlement = self.build(id, trade, payment);
                self.store.settlements.insert(id, settlement.clone());
                slot.insert(id);

                info!(
                    settlement_id = id,
                    trade_id = trade.id,
                    total = settlement.total_amount,
                    fee = settlement.fee_amount,
                    payout = settlement.settlement_amount,
                    "Settlement created"
                );
                metrics::counter!("settlements_created_total").increment(1);
                settlement
            }
        }
    }

    fn build(&self, id: i64, trade: &Trade, payment: &Payment) -> Settlement {
        let split = compute_split(payment.amount, self.config.fee_rate);
        Settlement {
            id,
            trade_id: trade.id,
            payment_id: payment.id,
            seller_id: trade.seller_id,
            buyer_id: trade.buyer_id,
            total_amount: split.total_amount,
            fee_amount: split.fee_amount,
            settlement_amount: split.settlement_amount,
            status: SettlementStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
            refunded_at: None,
        }
    }

    /// Complete PENDING settlements whose hold period has passed
    pub async fn process_pending(&self, now: DateTime<Utc>) -> usize {
        let hold = chrono::Duration::from_std(self.config.hold_period)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let due = self
            .store
            .settlements_where(|s| s.status == SettlementStatus::Pending && s.created_at + hold <= now);

        let mut completed = 0;
        for candidate in due {
            let _guard = match self.locks.acquire_trade(candidate.trade_id).await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(settlement_id = candidate.id, error = %e, "Settlement skipped, trade busy");
                    continue;
                }
            };

            let Some(mut settlement) = self.store.settlement(candidate.id) else {
                continue;
            };
            if settlement.status != SettlementStatus::Pending {
                continue;
            }
            settlement.status = SettlementStatus::Completed;
            settlement.settled_at = Some(now);
            self.store.settlements.insert(settlement.id, settlement.clone());
            completed += 1;

            info!(
                settlement_id = settlement.id,
                seller_id = settlement.seller_id,
                payout = settlement.settlement_amount,
                "Settlement completed"
            );
            self.notifications.send(
                NewNotification::new(
                    settlement.seller_id,
                    NotificationKind::SettlementCompleted,
                    "Settlement completed",
                    format!(
                        "{} has been settled to you ({} fee deducted)",
                        settlement.settlement_amount, settlement.fee_amount
                    ),
                )
                .with_trade(settlement.trade_id),
            );
        }

        if completed > 0 {
            metrics::counter!("settlements_completed_total").increment(completed as u64);
        }
        completed
    }

    /// Refund a settlement and reverse its payment with the provider
    pub async fn refund(
        &self,
        settlement_id: i64,
        actor: Actor,
        reason: &str,
        amount: i64,
    ) -> Result<RefundResponse, ApiError> {
        let trade_id = self
            .store
            .settlement(settlement_id)
            .ok_or_else(|| ApiError::not_found("Settlement"))?
            .trade_id;
        let _guard = self.locks.acquire_trade(trade_id).await?;

        let mut settlement = self
            .store
            .settlement(settlement_id)
            .ok_or_else(|| ApiError::not_found("Settlement"))?;

        if !actor.is_admin() {
            if actor.user_id != settlement.seller_id {
                return Err(ApiError::not_owner("settlement"));
            }
            if settlement.status == SettlementStatus::Completed {
                return Err(ApiError::with_details(
                    ErrorCode::AdminOverrideRequired,
                    "Completed settlements can only be refunded by an administrator",
                    format!("settlementId: {}", settlement_id),
                ));
            }
        }

        if settlement.status == SettlementStatus::Refunded {
            debug!(settlement_id = settlement_id, "Settlement already refunded");
            let existing = self
                .store
                .refunds
                .iter()
                .find(|r| r.settlement_id == settlement_id)
                .map(|r| r.value().clone());
            return Ok(RefundResponse {
                payment_id: settlement.payment_id,
                settlement_id,
                status: PaymentStatus::Refunded,
                refund: existing,
                already_refunded: true,
            });
        }

        if amount <= 0 || amount > settlement.total_amount {
            return Err(ApiError::with_details(
                ErrorCode::RefundAmountExceeded,
                ErrorCode::RefundAmountExceeded.message(),
                format!("amount: {}, paid: {}", amount, settlement.total_amount),
            ));
        }

        let mut payment = self
            .store
            .payment(settlement.payment_id)
            .ok_or_else(|| ApiError::not_found("Payment"))?;
        let merchant_uid = payment.merchant_uid.clone();

        with_retry(
            self.retry_attempts,
            self.retry_delay,
            "cancel_payment",
            || self.gateway.cancel_payment(&merchant_uid, amount, reason),
        )
        .await?;

        let now = Utc::now();
        let previous = payment.status;
        payment.status = PaymentStatus::Refunded;
        payment.refunded_at = Some(now);
        self.store.payments.insert(payment.id, payment.clone());
        self.store.append_payment_history(PaymentHistory {
            payment_id: payment.id,
            previous_status: Some(previous),
            new_status: PaymentStatus::Refunded,
            amount,
            at: now,
        });

        let refund = Refund {
            id: self.store.refund_seq.next(),
            payment_id: payment.id,
            settlement_id,
            reason: reason.to_string(),
            amount,
            requested_by: actor.user_id,
            created_at: now,
        };
        self.store.refunds.insert(refund.id, refund.clone());

        settlement.status = SettlementStatus::Refunded;
        settlement.refunded_at = Some(now);
        self.store.settlements.insert(settlement_id, settlement.clone());

        info!(
            settlement_id = settlement_id,
            payment_id = payment.id,
            amount = amount,
            requested_by = actor.user_id,
            "Settlement refunded"
        );
        metrics::counter!("refunds_issued_total").increment(1);

        self.notifications.send_all(
            [settlement.buyer_id, settlement.seller_id]
                .into_iter()
                .map(|user| {
                    NewNotification::new(
                        user,
                        NotificationKind::RefundCompleted,
                        "Refund completed",
                        format!("{} was refunded for trade #{}", amount, settlement.trade_id),
                    )
                    .with_trade(settlement.trade_id)
                })
                .collect(),
        );

        self.audit
            .log(AuditEvent::RefundIssued {
                requested_by: actor.user_id,
                settlement_id,
                amount,
                reason: reason.to_string(),
            })
            .await;

        Ok(RefundResponse {
            payment_id: payment.id,
            settlement_id,
            status: payment.status,
            refund: Some(refund),
            already_refunded: false,
        })
    }

    pub fn list_for_seller(&self, user_id: i64, pagination: &Pagination) -> PagedResult<Settlement> {
        pagination.apply(self.store.settlements_where(|s| s.seller_id == user_id))
    }

    /// A settlement visible to its seller, its buyer or an admin
    pub fn get_for_user(&self, settlement_id: i64, actor: Actor) -> Result<Settlement, ApiError> {
        let settlement = self
            .store
            .settlement(settlement_id)
            .ok_or_else(|| ApiError::not_found("Settlement"))?;
        if actor.is_admin()
            || actor.user_id == settlement.seller_id
            || actor.user_id == settlement.buyer_id
        {
            Ok(settlement)
        } else {
            Err(ApiError::not_owner("settlement"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Harness;

    #[tokio::test]
    async fn test_create_is_idempotent_and_splits_fee() {
        let h = Harness::new();
        let (trade, payment) = h.paid_trade(100_000).await;

        let first = h.settlements.create_for(&trade, &payment);
        let second = h.settlements.create_for(&trade, &payment);
        assert_eq!(first.id, second.id);
        assert_eq!(first.fee_amount, 10_000);
        assert_eq!(first.settlement_amount, 90_000);
        assert_eq!(h.store.settlements.len(), 1);
    }

    #[tokio::test]
    async fn test_process_pending_completes_and_notifies_seller() {
        let h = Harness::new();
        let (trade, _) = h.paid_trade(100_000).await;

        assert_eq!(h.settlements.process_pending(Utc::now()).await, 1);
        let settlement = h.store.settlement_for_trade(trade.id).unwrap();
        assert_eq!(settlement.status, SettlementStatus::Completed);
        assert!(settlement.settled_at.is_some());
        assert_eq!(h.settlements.process_pending(Utc::now()).await, 0);

        let seller_kinds: Vec<_> = h
            .notifications
            .list(trade.seller_id, &Pagination::default())
            .items
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert!(seller_kinds.contains(&NotificationKind::SettlementCompleted));
    }

    #[tokio::test]
    async fn test_refund_rules() {
        let h = Harness::new();
        let (trade, payment) = h.paid_trade(100_000).await;
        let settlement = h.store.settlement_for_trade(trade.id).unwrap();

        let err = h
            .settlements
            .refund(settlement.id, Actor::user(trade.buyer_id), "changed mind", 100_000)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotOwner);

        let err = h
            .settlements
            .refund(settlement.id, Actor::user(trade.seller_id), "too much", 100_001)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::RefundAmountExceeded);

        let refunded = h
            .settlements
            .refund(settlement.id, Actor::user(trade.seller_id), "out of stock", 100_000)
            .await
            .unwrap();
        assert!(!refunded.already_refunded);
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(h.gateway.cancelled_amount(&payment.merchant_uid), Some(100_000));

        let again = h
            .settlements
            .refund(settlement.id, Actor::user(trade.seller_id), "out of stock", 100_000)
            .await
            .unwrap();
        assert!(again.already_refunded);
        assert_eq!(h.gateway.cancelled_amount(&payment.merchant_uid), Some(100_000));
        assert_eq!(h.store.refunds.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_settlement_needs_admin() {
        let h = Harness::new();
        let (trade, _) = h.paid_trade(50_000).await;
        h.settlements.process_pending(Utc::now()).await;
        let settlement = h.store.settlement_for_trade(trade.id).unwrap();

        let err = h
            .settlements
            .refund(settlement.id, Actor::user(trade.seller_id), "late", 50_000)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::AdminOverrideRequired);

        let ok = h
            .settlements
            .refund(settlement.id, Actor::admin(900), "dispute", 50_000)
            .await
            .unwrap();
        assert_eq!(ok.refund.unwrap().requested_by, 900);
    }

    #[tokio::test]
    async fn test_get_for_user_visibility() {
        let h = Harness::new();
        let (trade, _) = h.paid_trade(10_000).await;
        let settlement = h.store.settlement_for_trade(trade.id).unwrap();

        assert!(h.settlements.get_for_user(settlement.id, Actor::user(trade.buyer_id)).is_ok());
        assert!(h.settlements.get_for_user(settlement.id, Actor::admin(900)).is_ok());
        assert_eq!(
            h.settlements
                .get_for_user(settlement.id, Actor::user(77))
                .unwrap_err()
                .error_code(),
            ErrorCode::NotOwner
        );
    }
}
