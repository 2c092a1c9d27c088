//! Public routes that don't require authentication.
//!
//! Includes: health checks, Prometheus metrics and Swagger UI.

use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::handlers::{health, metrics};
use crate::openapi::ApiDoc;

/// Build public routes that don't require authentication.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/stats", get(health::exchange_stats))
        .route("/metrics", get(metrics::get_prometheus_metrics))
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
}
