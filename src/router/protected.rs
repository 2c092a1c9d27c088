//! Protected routes that require authentication.
//!
//! Includes: bids, trades, payments, settlements, notifications and the
//! admin subtree.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::auth;
use crate::handlers::{bids, notifications, payments, settlements, trades};
use crate::router::admin::admin_routes;

/// Build protected routes that require authentication.
///
/// Everything here is mounted under `/v1`.
pub fn protected_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/bids", bid_routes())
        .nest("/trades", trade_routes())
        .nest("/payments", payment_routes())
        .nest("/settlements", settlement_routes())
        .nest("/notification", notification_routes())
        .nest("/admin", admin_routes(app_state.clone()))
        .layer(from_fn_with_state(app_state, auth::middleware::auth_middleware))
}

/// Order book routes
fn bid_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(bids::create_bid).get(bids::market_depth))
        .route("/me", get(bids::my_bids))
        .route("/{id}", patch(bids::amend_bid).delete(bids::withdraw_bid))
}

fn trade_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(trades::my_trades))
        .route("/{id}", get(trades::get_trade).delete(trades::cancel_trade))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/prepare", post(payments::prepare_payment))
        .route("/{id}/complete", post(payments::complete_payment))
        .route("/{id}/refund", post(payments::refund_payment))
        .route("/{id}/history", get(payments::payment_history))
}

fn settlement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(settlements::list_settlements))
        .route("/{id}", get(settlements::get_settlement))
}

/// Notification pull, read receipts and the SSE stream
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/subscribe", get(notifications::subscribe))
        .route("/{id}/read", patch(notifications::mark_as_read))
}
