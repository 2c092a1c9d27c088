//! Trade Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::ApiQuery;
use crate::handlers::queries::PaginationParams;
use crate::handlers::response::Paged;
use crate::models::trade::{TradeCancelResponse, TradeResponse};
use crate::AppState;

/// Cancel a trade awaiting payment
/// DELETE /v1/trades/{id}
///
/// The caller is penalised and the other party's bid goes back on the book.
#[utoipa::path(
    delete,
    path = "/v1/trades/{id}",
    tag = "trades",
    params(("id" = i64, Path, description = "Trade ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trade cancelled", body = TradeCancelResponse),
        (status = 403, description = "Not a party, or trade is no longer WAITING_PAYMENT (TRADE_4302)"),
        (status = 404, description = "Trade not found")
    )
)]
pub async fn cancel_trade(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(trade_id): Path<i64>,
) -> Result<Json<TradeCancelResponse>> {
    let response = state.trades.cancel(trade_id, user.0.sub).await?;
    Ok(Json(response))
}

/// One trade the caller is party to
/// GET /v1/trades/{id}
#[utoipa::path(
    get,
    path = "/v1/trades/{id}",
    tag = "trades",
    params(("id" = i64, Path, description = "Trade ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trade", body = TradeResponse),
        (status = 403, description = "Not a party"),
        (status = 404, description = "Trade not found")
    )
)]
pub async fn get_trade(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(trade_id): Path<i64>,
) -> Result<Json<TradeResponse>> {
    Ok(Json(state.trades.get(trade_id, user.0.sub)?))
}

/// GET /v1/trades/me
#[utoipa::path(
    get,
    path = "/v1/trades/me",
    tag = "trades",
    params(PaginationParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own trades with role", body = Paged<TradeResponse>)
    )
)]
pub async fn my_trades(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> Result<Json<Paged<TradeResponse>>> {
    let page = state.trades.my_trades(user.0.sub, &params.to_pagination());
    Ok(Json(page.into()))
}
