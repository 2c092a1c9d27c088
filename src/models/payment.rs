use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Prepared,
    Paid,
    Failed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Prepared => write!(f, "PREPARED"),
            PaymentStatus::Paid => write!(f, "PAID"),
            PaymentStatus::Failed => write!(f, "FAILED"),
            PaymentStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub trade_id: i64,
    pub payer_id: i64,
    /// Reference shared with the payment provider, `PAY-{yyyyMMdd}-{tradeId}`
    pub merchant_uid: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub provider_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn merchant_uid_for(date: NaiveDate, trade_id: i64) -> String {
        format!("PAY-{}-{}", date.format("%Y%m%d"), trade_id)
    }
}

/// Status transition recorded for every payment change
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistory {
    pub payment_id: i64,
    pub previous_status: Option<PaymentStatus>,
    pub new_status: PaymentStatus,
    pub amount: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: i64,
    pub payment_id: i64,
    pub settlement_id: i64,
    pub reason: String,
    pub amount: i64,
    pub requested_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreparePaymentRequest {
    #[validate(range(min = 1, message = "tradeId must be a positive id"))]
    pub trade_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreparePaymentResponse {
    pub id: i64,
    /// Merchant reference the client hands to the provider SDK
    pub payment_id: String,
    pub trade_id: i64,
    pub amount: i64,
    pub status: PaymentStatus,
    pub product_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletePaymentRequest {
    #[validate(length(min = 1, message = "impUid is required"))]
    pub imp_uid: String,
    #[validate(length(min = 1, message = "merchantUid is required"))]
    pub merchant_uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletePaymentResponse {
    pub payment_id: i64,
    pub trade_id: i64,
    pub amount: i64,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub settlement_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub trade_id: Option<i64>,
    #[validate(length(min = 1, max = 200, message = "reason must be 1-200 characters"))]
    pub reason: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub payment_id: i64,
    pub settlement_id: i64,
    pub status: PaymentStatus,
    pub refund: Option<Refund>,
    /// True when the settlement had already been refunded and nothing changed
    pub already_refunded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merchant_uid_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(Payment::merchant_uid_for(date, 42), "PAY-20250309-42");
    }
}
