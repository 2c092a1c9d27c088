//! Payment preparation, provider verification and refunds
//!
//! A payment is prepared by the buyer of a WAITING_PAYMENT trade, paid through
//! the provider's client SDK, then completed here after the provider confirms
//! it. Completion holds the trade lock so a trade is never paid and cancelled
//! at the same time.

pub mod gateway;
pub mod portone;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::auth::Actor;
use crate::database::Store;
use crate::error::{ApiError, ErrorCode};
use crate::models::payment::{
    CompletePaymentRequest, CompletePaymentResponse, PreparePaymentResponse, RefundRequest,
    RefundResponse,
};
use crate::models::{Payment, PaymentHistory, PaymentStatus};
use crate::services::audit_logger::{AuditEvent, AuditLogger};
use crate::services::catalog::Catalog;
use crate::services::lock::KeyedLocks;
use crate::services::settlement::SettlementService;
use crate::services::trade_lifecycle::TradeLifecycle;

use gateway::{with_retry, PaymentGateway, ProviderPaymentStatus};

#[derive(Clone)]
pub struct PaymentService {
    store: Store,
    gateway: Arc<dyn PaymentGateway>,
    trades: TradeLifecycle,
    settlements: SettlementService,
    audit: AuditLogger,
    locks: KeyedLocks,
    catalog: Catalog,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        gateway: Arc<dyn PaymentGateway>,
        trades: TradeLifecycle,
        settlements: SettlementService,
        audit: AuditLogger,
        locks: KeyedLocks,
        catalog: Catalog,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            trades,
            settlements,
            audit,
            locks,
            catalog,
            retry_attempts,
            retry_delay,
        }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Create (or return the open) payment for a trade awaiting payment
    pub async fn prepare(
        &self,
        user_id: i64,
        trade_id: i64,
    ) -> Result<PreparePaymentResponse, ApiError> {
        let _guard = self.locks.acquire_trade(trade_id).await?;

        let trade = self
            .store
            .trade(trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        if trade.buyer_id != user_id {
            return Err(ApiError::not_owner("trade"));
        }
        if !trade.is_waiting_payment() {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                "Trade is not awaiting payment",
                format!("status: {}", trade.status),
            ));
        }

        let now = Utc::now();
        let payment = match self.store.payment_for_trade(trade_id) {
            Some(existing) if existing.status == PaymentStatus::Prepared => {
                debug!(payment_id = existing.id, trade_id = trade_id, "Payment already prepared");
                existing
            }
            Some(mut failed) if failed.status == PaymentStatus::Failed => {
                failed.status = PaymentStatus::Prepared;
                failed.amount = trade.price;
                self.store.payments.insert(failed.id, failed.clone());
                self.store.append_payment_history(PaymentHistory {
                    payment_id: failed.id,
                    previous_status: Some(PaymentStatus::Failed),
                    new_status: PaymentStatus::Prepared,
                    amount: failed.amount,
                    at: now,
                });
                failed
            }
            Some(done) => {
                return Err(ApiError::invalid_state(format!(
                    "Payment for trade {} is already {}",
                    trade_id, done.status
                )))
            }
            None => {
                let payment = Payment {
                    id: self.store.payment_seq.next(),
                    trade_id,
                    payer_id: user_id,
                    merchant_uid: Payment::merchant_uid_for(now.date_naive(), trade_id),
                    amount: trade.price,
                    status: PaymentStatus::Prepared,
                    provider_uid: None,
                    created_at: now,
                    paid_at: None,
                    refunded_at: None,
                };
                self.store.payments.insert(payment.id, payment.clone());
                self.store.payment_by_trade.insert(trade_id, payment.id);
                self.store.append_payment_history(PaymentHistory {
                    payment_id: payment.id,
                    previous_status: None,
                    new_status: PaymentStatus::Prepared,
                    amount: payment.amount,
                    at: now,
                });
                info!(
                    payment_id = payment.id,
                    trade_id = trade_id,
                    merchant_uid = %payment.merchant_uid,
                    amount = payment.amount,
                    "Payment prepared"
                );
                payment
            }
        };

        with_retry(
            self.retry_attempts,
            self.retry_delay,
            "register_intent",
            || self.gateway.register_intent(&payment.merchant_uid, payment.amount),
        )
        .await?;

        Ok(PreparePaymentResponse {
            id: payment.id,
            payment_id: payment.merchant_uid.clone(),
            trade_id,
            amount: payment.amount,
            status: payment.status,
            product_name: self.catalog.option_label(trade.product_option_id),
        })
    }

    /// Verify a payment with the provider and complete its trade
    pub async fn complete(
        &self,
        user_id: i64,
        payment_id: i64,
        request: CompletePaymentRequest,
    ) -> Result<CompletePaymentResponse, ApiError> {
        let payment = self
            .store
            .payment(payment_id)
            .ok_or_else(|| ApiError::not_found("Payment"))?;
        if payment.payer_id != user_id {
            return Err(ApiError::not_owner("payment"));
        }
        if payment.merchant_uid != request.merchant_uid {
            return Err(ApiError::with_details(
                ErrorCode::MerchantMismatch,
                ErrorCode::MerchantMismatch.message(),
                format!("merchantUid: {}", request.merchant_uid),
            ));
        }

        let _guard = self.locks.acquire_trade(payment.trade_id).await?;

        let mut payment = self
            .store
            .payment(payment_id)
            .ok_or_else(|| ApiError::not_found("Payment"))?;
        match payment.status {
            PaymentStatus::Paid => return self.completed_response(&payment),
            PaymentStatus::Prepared => {}
            other => {
                return Err(ApiError::invalid_state(format!(
                    "Payment is {}, prepare it again before completing",
                    other
                )))
            }
        }

        let trade = self
            .store
            .trade(payment.trade_id)
            .ok_or_else(|| ApiError::not_found("Trade"))?;
        if !trade.is_waiting_payment() {
            return Err(ApiError::with_details(
                ErrorCode::InvalidState,
                "Trade is not awaiting payment",
                format!("status: {}", trade.status),
            ));
        }

        let merchant_uid = payment.merchant_uid.clone();
        let provider = with_retry(
            self.retry_attempts,
            self.retry_delay,
            "fetch_payment",
            || self.gateway.fetch_payment(&merchant_uid),
        )
        .await?;

        if provider.status != ProviderPaymentStatus::Paid {
            return Err(ApiError::with_details(
                ErrorCode::PaymentNotConfirmed,
                ErrorCode::PaymentNotConfirmed.message(),
                format!("provider status: {:?}", provider.status),
            ));
        }

        let now = Utc::now();
        if provider.amount != payment.amount {
            error!(
                payment_id = payment_id,
                expected = payment.amount,
                actual = provider.amount,
                "Provider amount does not match trade price"
            );
            payment.status = PaymentStatus::Failed;
            self.store.payments.insert(payment_id, payment.clone());
            self.store.append_payment_history(PaymentHistory {
                payment_id,
                previous_status: Some(PaymentStatus::Prepared),
                new_status: PaymentStatus::Failed,
                amount: provider.amount,
                at: now,
            });
            self.audit
                .log(AuditEvent::PaymentMismatch {
                    user_id,
                    payment_id,
                    expected: payment.amount,
                    actual: provider.amount,
                })
                .await;
            return Err(ApiError::with_details(
                ErrorCode::PaymentAmountMismatch,
                ErrorCode::PaymentAmountMismatch.message(),
                format!("expected: {}, paid: {}", payment.amount, provider.amount),
            ));
        }

        payment.status = PaymentStatus::Paid;
        payment.paid_at = Some(now);
        payment.provider_uid = Some(request.imp_uid);
        self.store.payments.insert(payment_id, payment.clone());
        self.store.append_payment_history(PaymentHistory {
            payment_id,
            previous_status: Some(PaymentStatus::Prepared),
            new_status: PaymentStatus::Paid,
            amount: payment.amount,
            at: now,
        });

        let trade = self.trades.complete_locked(trade.id)?;
        let settlement = self.settlements.create_for(&trade, &payment);

        info!(
            payment_id = payment_id,
            trade_id = trade.id,
            amount = payment.amount,
            provider = self.gateway.name(),
            "Payment completed"
        );
        metrics::counter!("payments_completed_total").increment(1);
        self.audit
            .log(AuditEvent::PaymentCompleted {
                user_id,
                payment_id,
                trade_id: trade.id,
                amount: payment.amount,
            })
            .await;

        Ok(CompletePaymentResponse {
            payment_id,
            trade_id: trade.id,
            amount: payment.amount,
            status: payment.status,
            paid_at: payment.paid_at,
            settlement_id: settlement.id,
        })
    }

    fn completed_response(&self, payment: &Payment) -> Result<CompletePaymentResponse, ApiError> {
        let settlement = self
            .store
            .settlement_for_trade(payment.trade_id)
            .ok_or_else(|| ApiError::Internal("Paid payment without settlement".to_string()))?;
        Ok(CompletePaymentResponse {
            payment_id: payment.id,
            trade_id: payment.trade_id,
            amount: payment.amount,
            status: payment.status,
            paid_at: payment.paid_at,
            settlement_id: settlement.id,
        })
    }

    /// Refund the settlement belonging to a payment
    pub async fn refund(
        &self,
        payment_id: i64,
        actor: Actor,
        request: RefundRequest,
    ) -> Result<RefundResponse, ApiError> {
        let payment = self
            .store
            .payment(payment_id)
            .ok_or_else(|| ApiError::not_found("Payment"))?;
        if let Some(trade_id) = request.trade_id {
            if trade_id != payment.trade_id {
                return Err(ApiError::validation_field(
                    "tradeId",
                    "tradeId does not belong to this payment",
                ));
            }
        }
        let settlement = self
            .store
            .settlement_for_trade(payment.trade_id)
            .ok_or_else(|| ApiError::invalid_state("Payment has not been settled"))?;

        self.settlements
            .refund(settlement.id, actor, &request.reason, request.amount)
            .await
    }

    pub fn history(&self, payment_id: i64, actor: Actor) -> Result<Vec<PaymentHistory>, ApiError> {
        let payment = self
            .store
            .payment(payment_id)
            .ok_or_else(|| ApiError::not_found("Payment"))?;
        if !actor.is_admin() && payment.payer_id != actor.user_id {
            return Err(ApiError::not_owner("payment"));
        }
        Ok(self.store.payment_history_for(payment_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SettlementStatus, TradeStatus};
    use crate::services::testing::Harness;

    #[tokio::test]
    async fn test_prepare_is_idempotent_and_buyer_only() {
        let h = Harness::new();
        let trade = h.matched_trade(120_000).await;

        let err = h.payments.prepare(trade.seller_id, trade.id).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotOwner);

        let first = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();
        let second = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.amount, 120_000);
        assert!(first.payment_id.starts_with("PAY-"));
        assert!(first.payment_id.ends_with(&format!("-{}", trade.id)));
    }

    #[tokio::test]
    async fn test_complete_moves_trade_and_creates_settlement() {
        let h = Harness::new();
        let trade = h.matched_trade(100_000).await;
        let prepared = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();

        let done = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: prepared.payment_id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, PaymentStatus::Paid);
        assert_eq!(h.store.trade(trade.id).unwrap().status, TradeStatus::PaymentCompleted);

        let settlement = h.store.settlement(done.settlement_id).unwrap();
        assert_eq!(settlement.status, SettlementStatus::Pending);
        assert_eq!(settlement.fee_amount + settlement.settlement_amount, 100_000);

        // replay returns the same result
        let replay = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: prepared.payment_id,
                },
            )
            .await
            .unwrap();
        assert_eq!(replay.settlement_id, done.settlement_id);
    }

    #[tokio::test]
    async fn test_amount_mismatch_keeps_trade_waiting() {
        let h = Harness::new();
        let trade = h.matched_trade(100_000).await;
        let prepared = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();
        h.gateway
            .set_payment(&prepared.payment_id, ProviderPaymentStatus::Paid, 1_000);

        let err = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: prepared.payment_id.clone(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PaymentAmountMismatch);
        assert_eq!(h.store.trade(trade.id).unwrap().status, TradeStatus::WaitingPayment);
        assert_eq!(h.store.payment(prepared.id).unwrap().status, PaymentStatus::Failed);
        assert!(h.store.settlement_for_trade(trade.id).is_none());

        // preparing again reopens the same payment
        let reopened = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();
        assert_eq!(reopened.id, prepared.id);
        assert_eq!(reopened.status, PaymentStatus::Prepared);
    }

    #[tokio::test]
    async fn test_merchant_mismatch_and_unconfirmed() {
        let h = Harness::new();
        let trade = h.matched_trade(100_000).await;
        let prepared = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();

        let err = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: "PAY-19700101-0".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MerchantMismatch);

        h.gateway
            .set_payment(&prepared.payment_id, ProviderPaymentStatus::Ready, 100_000);
        let err = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: prepared.payment_id,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PaymentNotConfirmed);
    }

    #[tokio::test]
    async fn test_provider_outage_is_retried() {
        let h = Harness::new();
        let trade = h.matched_trade(100_000).await;
        let prepared = h.payments.prepare(trade.buyer_id, trade.id).await.unwrap();
        h.gateway.fail_next(2);

        let done = h
            .payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_1".to_string(),
                    merchant_uid: prepared.payment_id,
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_refund_checks_trade_reference() {
        let h = Harness::new();
        let (trade, payment) = h.paid_trade(100_000).await;

        let err = h
            .payments
            .refund(
                payment.id,
                Actor::user(trade.seller_id),
                RefundRequest {
                    trade_id: Some(trade.id + 100),
                    reason: "wrong trade".to_string(),
                    amount: 100_000,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);

        let ok = h
            .payments
            .refund(
                payment.id,
                Actor::user(trade.seller_id),
                RefundRequest {
                    trade_id: Some(trade.id),
                    reason: "out of stock".to_string(),
                    amount: 100_000,
                },
            )
            .await
            .unwrap();
        assert_eq!(ok.status, PaymentStatus::Refunded);

        let history = h.payments.history(payment.id, Actor::user(trade.buyer_id)).unwrap();
        let statuses: Vec<_> = history.iter().map(|e| e.new_status).collect();
        assert_eq!(
            statuses,
            vec![PaymentStatus::Prepared, PaymentStatus::Paid, PaymentStatus::Refunded]
        );
    }
}
