//! Settlement Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::ApiQuery;
use crate::handlers::queries::PaginationParams;
use crate::handlers::response::Paged;
use crate::models::Settlement;
use crate::AppState;

/// Settlements paid out to the caller as seller
/// GET /v1/settlements
#[utoipa::path(
    get,
    path = "/v1/settlements",
    tag = "settlements",
    params(PaginationParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own settlements, newest first", body = Paged<Settlement>)
    )
)]
pub async fn list_settlements(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> Result<Json<Paged<Settlement>>> {
    let page = state
        .settlements
        .list_for_seller(user.0.sub, &params.to_pagination());
    Ok(Json(page.into()))
}

/// GET /v1/settlements/{id}
#[utoipa::path(
    get,
    path = "/v1/settlements/{id}",
    tag = "settlements",
    params(("id" = i64, Path, description = "Settlement ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Settlement", body = Settlement),
        (status = 403, description = "Neither buyer, seller nor admin"),
        (status = 404, description = "Settlement not found")
    )
)]
pub async fn get_settlement(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(settlement_id): Path<i64>,
) -> Result<Json<Settlement>> {
    let settlement = state
        .settlements
        .get_for_user(settlement_id, user.0.actor())?;
    Ok(Json(settlement))
}
