//! Bid Handlers
//!
//! Registration, amendment, withdrawal and market depth

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::{ApiQuery, ValidatedJson};
use crate::handlers::queries::{DepthQuery, PaginationParams, WithdrawQuery};
use crate::handlers::response::{Created, Paged};
use crate::models::bid::{BidCancelResponse, BidRequest, BidResponse};
use crate::AppState;

/// Register a bid
/// POST /v1/bids
#[utoipa::path(
    post,
    path = "/v1/bids",
    tag = "bids",
    request_body = BidRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Bid registered; tradeId is set when it matched immediately", body = BidResponse),
        (status = 400, description = "Invalid price or body"),
        (status = 403, description = "Bidding restricted by an active penalty"),
        (status = 404, description = "Unknown product option"),
        (status = 429, description = "Too many bid changes"),
        (status = 503, description = "Order book busy, retry")
    )
)]
pub async fn create_bid(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<BidRequest>,
) -> Result<Created<BidResponse>> {
    let bid = state.order_book.submit(user.0.sub, request).await?;
    info!(
        user_id = user.0.sub,
        bid_id = bid.id,
        matched = bid.trade_id.is_some(),
        "Bid registered"
    );
    Ok(Created(bid))
}

/// Amend a pending bid
/// PATCH /v1/bids/{id}
#[utoipa::path(
    patch,
    path = "/v1/bids/{id}",
    tag = "bids",
    request_body = BidRequest,
    params(("id" = i64, Path, description = "Bid ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bid amended", body = BidResponse),
        (status = 403, description = "Not the owner or penalty active"),
        (status = 404, description = "Bid not found"),
        (status = 409, description = "Bid is no longer PENDING")
    )
)]
pub async fn amend_bid(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(bid_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<BidRequest>,
) -> Result<Json<BidResponse>> {
    let bid = state.order_book.amend(user.0.sub, bid_id, request).await?;
    Ok(Json(bid))
}

/// Withdraw a bid
/// DELETE /v1/bids/{id}
///
/// A MATCHED bid is only withdrawn with `confirmTradeCancel=true`, which cancels
/// its trade and penalises the caller.
#[utoipa::path(
    delete,
    path = "/v1/bids/{id}",
    tag = "bids",
    params(
        ("id" = i64, Path, description = "Bid ID"),
        WithdrawQuery
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bid withdrawn; with confirmTradeCancel the body is a TradeCancelResponse", body = BidCancelResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Bid not found"),
        (status = 409, description = "Bid cannot be withdrawn in its current state")
    )
)]
pub async fn withdraw_bid(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(bid_id): Path<i64>,
    ApiQuery(query): ApiQuery<WithdrawQuery>,
) -> Result<Response> {
    if query.confirm_trade_cancel {
        let cancelled = state.trades.cancel_for_bid(bid_id, user.0.sub).await?;
        return Ok(Json(cancelled).into_response());
    }

    let withdrawn = state.order_book.withdraw(user.0.sub, bid_id).await?;
    Ok(Json(withdrawn).into_response())
}

/// Market depth for one product option
/// GET /v1/bids?productOptionId=
#[utoipa::path(
    get,
    path = "/v1/bids",
    tag = "bids",
    params(DepthQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending bids, BUY best-first then SELL best-first", body = Paged<BidResponse>),
        (status = 404, description = "Unknown product option")
    )
)]
pub async fn market_depth(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<DepthQuery>,
) -> Result<Json<Paged<BidResponse>>> {
    let bids = state.order_book.depth(query.product_option_id)?;
    Ok(Json(Paged::single(bids)))
}

/// The caller's bids, newest first
/// GET /v1/bids/me
#[utoipa::path(
    get,
    path = "/v1/bids/me",
    tag = "bids",
    params(PaginationParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own bids", body = Paged<BidResponse>)
    )
)]
pub async fn my_bids(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> Result<Json<Paged<BidResponse>>> {
    let page = state.order_book.my_bids(user.0.sub, &params.to_pagination());
    Ok(Json(page.into()))
}
