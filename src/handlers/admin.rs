// Admin endpoints for market monitoring and override
// Requires admin authentication

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::warn;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::{ApiQuery, ValidatedJson};
use crate::handlers::queries::{AdminBidQuery, AdminTradeQuery, AuditQuery};
use crate::handlers::response::{ListResponse, Paged};
use crate::models::admin::{
    AdminBidCancelResponse, AdminCancelRequest, BidMonitorRow, SweepResponse, TradeMonitorRow,
};
use crate::models::trade::TradeCancelResponse;
use crate::services::AuditEventRecord;
use crate::AppState;

/// Search bids
/// GET /v1/admin/bids
#[utoipa::path(
    get,
    path = "/v1/admin/bids",
    tag = "admin",
    params(AdminBidQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bids matching the filters, newest first", body = Paged<BidMonitorRow>),
        (status = 400, description = "Unknown status or type"),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn monitor_bids(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdminBidQuery>,
) -> Result<Json<Paged<BidMonitorRow>>> {
    let filter = query.to_filter()?;
    Ok(Json(state.admin.monitor_bids(&filter, query.page).into()))
}

/// Force-cancel a pending bid
/// PATCH /v1/admin/bids/{id}
#[utoipa::path(
    patch,
    path = "/v1/admin/bids/{id}",
    tag = "admin",
    request_body = AdminCancelRequest,
    params(("id" = i64, Path, description = "Bid ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bid cancelled", body = AdminBidCancelResponse),
        (status = 400, description = "Unknown reason code or missing comment"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Bid not found"),
        (status = 409, description = "Bid is not PENDING")
    )
)]
pub async fn force_cancel_bid(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(bid_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<AdminCancelRequest>,
) -> Result<Json<AdminBidCancelResponse>> {
    let response = state
        .admin
        .force_cancel_bid(user.0.sub, bid_id, request)
        .await
        .inspect_err(|e| warn!(admin_id = user.0.sub, bid_id = bid_id, error = %e, "Force-cancel rejected"))?;
    Ok(Json(response))
}

/// Search trades
/// GET /v1/admin/trades
#[utoipa::path(
    get,
    path = "/v1/admin/trades",
    tag = "admin",
    params(AdminTradeQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trades matching the filters, newest first", body = Paged<TradeMonitorRow>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn monitor_trades(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdminTradeQuery>,
) -> Result<Json<Paged<TradeMonitorRow>>> {
    let filter = query.to_filter()?;
    Ok(Json(state.admin.monitor_trades(&filter, query.page).into()))
}

/// Force-cancel a trade awaiting payment; neither party is penalised
/// PATCH /v1/admin/trades/{id}
#[utoipa::path(
    patch,
    path = "/v1/admin/trades/{id}",
    tag = "admin",
    request_body = AdminCancelRequest,
    params(("id" = i64, Path, description = "Trade ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trade cancelled", body = TradeCancelResponse),
        (status = 400, description = "Unknown reason code or missing comment"),
        (status = 404, description = "Trade not found"),
        (status = 409, description = "Trade is not WAITING_PAYMENT")
    )
)]
pub async fn force_cancel_trade(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(trade_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<AdminCancelRequest>,
) -> Result<Json<TradeCancelResponse>> {
    let response = state
        .admin
        .force_cancel_trade(user.0.sub, trade_id, request)
        .await
        .inspect_err(|e| warn!(admin_id = user.0.sub, trade_id = trade_id, error = %e, "Force-cancel rejected"))?;
    Ok(Json(response))
}

/// Run a full matching sweep over every option
/// POST /v1/admin/matching/sweep
#[utoipa::path(
    post,
    path = "/v1/admin/matching/sweep",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trades created by the sweep", body = SweepResponse),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn matching_sweep(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SweepResponse>> {
    Ok(Json(state.admin.rematch(user.0.sub).await?))
}

/// Recent audit records
/// GET /v1/admin/audit
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "admin",
    params(AuditQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Most recent first", body = ListResponse<AuditEventRecord>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn audit_log(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Json<ListResponse<AuditEventRecord>> {
    let records = state
        .admin
        .audit_log(query.event_type.as_deref(), query.limit())
        .await;
    Json(ListResponse::new(records))
}
