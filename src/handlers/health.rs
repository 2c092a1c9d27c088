use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::health_check::{DetailedHealthStatus, ExchangeStats, HealthCheckStatus};
use crate::services::HealthChecker;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Process is up", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness check with dependency status and market counts
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Healthy or degraded", body = DetailedHealthStatus),
        (status = 503, description = "A dependency is unhealthy", body = DetailedHealthStatus)
    )
)]
pub async fn health_check(
    State(checker): State<HealthChecker>,
) -> (StatusCode, Json<DetailedHealthStatus>) {
    let status = checker.perform_health_check().await;
    let code = match status.status {
        HealthCheckStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthCheckStatus::Healthy | HealthCheckStatus::Degraded => StatusCode::OK,
    };
    (code, Json(status))
}

/// Open bids, waiting trades and pending settlements
/// GET /health/stats
#[utoipa::path(
    get,
    path = "/health/stats",
    tag = "health",
    responses(
        (status = 200, description = "Exchange counters", body = ExchangeStats)
    )
)]
pub async fn exchange_stats(State(checker): State<HealthChecker>) -> Json<ExchangeStats> {
    Json(checker.stats())
}
