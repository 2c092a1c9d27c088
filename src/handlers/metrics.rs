// Metrics endpoint for Prometheus

use crate::{error::ApiError, AppState};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Prometheus metrics endpoint
///
/// Answers 503 when no recorder was installed at startup
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    summary = "Prometheus metrics",
    description = "Export Prometheus metrics for monitoring and alerting",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain"),
        (status = 503, description = "Metrics recorder not installed")
    )
)]
pub async fn get_prometheus_metrics(
    State(app_state): State<AppState>,
) -> Result<Response, ApiError> {
    let Some(handle) = app_state.metrics_handle.as_ref() else {
        return Ok((StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response());
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(handle.render().into())
        .map_err(|_| ApiError::Internal("Failed to create response".to_string()))
}
