use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::error::{ApiError, ErrorCode};

/// Payment state as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPaymentStatus {
    Ready,
    Paid,
    Failed,
    Cancelled,
    PartialCancelled,
    Other(String),
}

impl ProviderPaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "READY" | "PENDING" | "VIRTUAL_ACCOUNT_ISSUED" => Self::Ready,
            "PAID" => Self::Paid,
            "FAILED" => Self::Failed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            "PARTIAL_CANCELLED" => Self::PartialCancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPayment {
    pub merchant_uid: String,
    pub status: ProviderPaymentStatus,
    pub amount: i64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Rejected { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Decode(_) => false,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Transport(msg) if msg.contains("timed out") => {
                ApiError::with_code(ErrorCode::ExternalServiceTimeout, err.to_string())
            }
            _ => ApiError::provider(err.to_string()),
        }
    }
}

/// Outbound payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Look up a payment by merchant reference
    async fn fetch_payment(&self, merchant_uid: &str) -> Result<ProviderPayment, GatewayError>;

    /// Cancel (refund) `amount` of a paid payment
    async fn cancel_payment(
        &self,
        merchant_uid: &str,
        amount: i64,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Announce an expected payment before the client pays
    async fn register_intent(&self, _merchant_uid: &str, _amount: i64) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Run `op` up to `attempts` times while it fails with a retryable error
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    operation: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = attempts.max(1);
    let mut backoff = delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    operation = operation,
                    attempt = attempt,
                    error = %e,
                    "Payment provider call failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// In-process provider that approves every registered payment at its amount
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    payments: Arc<DashMap<String, ProviderPayment>>,
    cancellations: Arc<DashMap<String, i64>>,
    failures: Arc<AtomicU32>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override what the provider reports for `merchant_uid`
    pub fn set_payment(&self, merchant_uid: &str, status: ProviderPaymentStatus, amount: i64) {
        self.payments.insert(
            merchant_uid.to_string(),
            ProviderPayment {
                merchant_uid: merchant_uid.to_string(),
                status,
                amount,
            },
        );
    }

    /// Make the next `count` calls fail with a transport error
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn cancelled_amount(&self, merchant_uid: &str) -> Option<i64> {
        self.cancellations.get(merchant_uid).map(|a| *a)
    }

    fn take_failure(&self) -> Result<(), GatewayError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(GatewayError::Transport("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_payment(&self, merchant_uid: &str) -> Result<ProviderPayment, GatewayError> {
        self.take_failure()?;
        self.payments
            .get(merchant_uid)
            .map(|p| p.clone())
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: format!("payment {} not found", merchant_uid),
            })
    }

    async fn cancel_payment(
        &self,
        merchant_uid: &str,
        amount: i64,
        _reason: &str,
    ) -> Result<(), GatewayError> {
        self.take_failure()?;
        let mut payment = self
            .payments
            .get_mut(merchant_uid)
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: format!("payment {} not found", merchant_uid),
            })?;
        payment.status = if amount >= payment.amount {
            ProviderPaymentStatus::Cancelled
        } else {
            ProviderPaymentStatus::PartialCancelled
        };
        drop(payment);
        *self
            .cancellations
            .entry(merchant_uid.to_string())
            .or_insert(0) += amount;
        Ok(())
    }

    async fn register_intent(&self, merchant_uid: &str, amount: i64) -> Result<(), GatewayError> {
        // keep explicit test overrides
        self.payments
            .entry(merchant_uid.to_string())
            .or_insert_with(|| ProviderPayment {
                merchant_uid: merchant_uid.to_string(),
                status: ProviderPaymentStatus::Paid,
                amount,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let gateway = MockPaymentGateway::new();
        gateway.register_intent("PAY-1", 1000).await.unwrap();
        gateway.fail_next(2);

        let payment = with_retry(3, Duration::from_millis(1), "fetch", || {
            gateway.fetch_payment("PAY-1")
        })
        .await
        .unwrap();
        assert_eq!(payment.status, ProviderPaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let gateway = MockPaymentGateway::new();
        gateway.register_intent("PAY-1", 1000).await.unwrap();
        gateway.fail_next(5);

        let err = with_retry(2, Duration::from_millis(1), "fetch", || {
            gateway.fetch_payment("PAY-1")
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let gateway = MockPaymentGateway::new();
        let err = gateway.fetch_payment("missing").await.unwrap_err();
        assert!(!err.is_retryable());
        let api: ApiError = err.into();
        assert_eq!(api.error_code(), ErrorCode::PaymentProviderError);
    }

    #[tokio::test]
    async fn test_register_intent_keeps_overrides() {
        let gateway = MockPaymentGateway::new();
        gateway.set_payment("PAY-2", ProviderPaymentStatus::Paid, 1);
        gateway.register_intent("PAY-2", 5000).await.unwrap();
        assert_eq!(gateway.fetch_payment("PAY-2").await.unwrap().amount, 1);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ProviderPaymentStatus::parse("paid"), ProviderPaymentStatus::Paid);
        assert_eq!(
            ProviderPaymentStatus::parse("CANCELLED"),
            ProviderPaymentStatus::Cancelled
        );
        assert_eq!(
            ProviderPaymentStatus::parse("WEIRD"),
            ProviderPaymentStatus::Other("WEIRD".to_string())
        );
    }
}
