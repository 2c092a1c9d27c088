//! Payment Handlers
//!
//! Prepare, provider verification, refund and status history

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::ValidatedJson;
use crate::handlers::response::ListResponse;
use crate::models::payment::{
    CompletePaymentRequest, CompletePaymentResponse, PaymentHistory, PreparePaymentRequest,
    PreparePaymentResponse, RefundRequest, RefundResponse,
};
use crate::AppState;

/// Prepare a payment for a matched trade
/// POST /v1/payments/prepare
///
/// Calling it again for the same trade returns the same payment.
#[utoipa::path(
    post,
    path = "/v1/payments/prepare",
    tag = "payments",
    request_body = PreparePaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment prepared", body = PreparePaymentResponse),
        (status = 403, description = "Only the buyer may pay"),
        (status = 404, description = "Trade not found"),
        (status = 409, description = "Trade is not awaiting payment")
    )
)]
pub async fn prepare_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<PreparePaymentRequest>,
) -> Result<Json<PreparePaymentResponse>> {
    let prepared = state.payments.prepare(user.0.sub, request.trade_id).await?;
    Ok(Json(prepared))
}

/// Verify a payment with the provider and complete the trade
/// POST /v1/payments/{id}/complete
#[utoipa::path(
    post,
    path = "/v1/payments/{id}/complete",
    tag = "payments",
    request_body = CompletePaymentRequest,
    params(("id" = i64, Path, description = "Payment ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment verified, trade completed", body = CompletePaymentResponse),
        (status = 400, description = "Amount or merchant reference mismatch"),
        (status = 403, description = "Not the payer"),
        (status = 409, description = "Payment or trade in the wrong state"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn complete_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<CompletePaymentRequest>,
) -> Result<Json<CompletePaymentResponse>> {
    let completed = state
        .payments
        .complete(user.0.sub, payment_id, request)
        .await?;
    info!(
        payment_id = completed.payment_id,
        trade_id = completed.trade_id,
        "Payment completed"
    );
    Ok(Json(completed))
}

/// Refund a paid payment
/// POST /v1/payments/{id}/refund
#[utoipa::path(
    post,
    path = "/v1/payments/{id}/refund",
    tag = "payments",
    request_body = RefundRequest,
    params(("id" = i64, Path, description = "Payment ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Refund issued, or the existing refund when already refunded", body = RefundResponse),
        (status = 400, description = "Amount exceeds the payment"),
        (status = 403, description = "Not the seller, or admin needed for a completed settlement"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<RefundRequest>,
) -> Result<Json<RefundResponse>> {
    let refunded = state
        .payments
        .refund(payment_id, user.0.actor(), request)
        .await?;
    Ok(Json(refunded))
}

/// GET /v1/payments/{id}/history
#[utoipa::path(
    get,
    path = "/v1/payments/{id}/history",
    tag = "payments",
    params(("id" = i64, Path, description = "Payment ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Status changes, oldest first", body = ListResponse<PaymentHistory>),
        (status = 403, description = "Not the payer")
    )
)]
pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<i64>,
) -> Result<Json<ListResponse<PaymentHistory>>> {
    let history = state.payments.history(payment_id, user.0.actor())?;
    Ok(Json(ListResponse::new(history)))
}
