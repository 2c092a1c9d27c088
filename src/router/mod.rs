//! Router configuration module
//!
//! Public probes and docs at the root, the authenticated exchange API under `/v1`.

pub mod admin;
pub mod protected;
pub mod public;

use axum::{middleware::from_fn, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::app_state::AppState;
use crate::constants::api;
use crate::middleware::{active_requests_middleware, metrics_middleware, request_logger_middleware};

pub use protected::protected_routes;
pub use public::public_routes;

/// Build the application router.
pub fn build_router(app_state: AppState) -> Router {
    let request_timeout = Duration::from_secs(app_state.config.request_timeout.max(1));

    public_routes()
        .nest(&format!("/{}", api::VERSION), protected_routes(app_state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(request_logger_middleware))
                .layer(from_fn(active_requests_middleware))
                .layer(from_fn(metrics_middleware))
                .layer(TimeoutLayer::with_status_code(
                    axum::http::StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}
