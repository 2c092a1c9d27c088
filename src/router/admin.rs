//! Admin-only routes.
//!
//! Nested inside the protected tree, so claims are already present when the
//! role check runs.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::auth::middleware::require_admin_role;
use crate::handlers::admin;

/// Build admin-only routes.
pub fn admin_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/bids", get(admin::monitor_bids))
        .route("/bids/{id}", patch(admin::force_cancel_bid))
        .route("/trades", get(admin::monitor_trades))
        .route("/trades/{id}", patch(admin::force_cancel_trade))
        .route("/matching/sweep", post(admin::matching_sweep))
        .route("/audit", get(admin::audit_log))
        .layer(from_fn_with_state(app_state, require_admin_role))
}
