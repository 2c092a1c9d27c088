use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Route template when axum matched one, so ids do not explode label cardinality
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware that tracks request metrics
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = route_label(&request);
    let start = Instant::now();

    counter!("http_requests_total", "method" => method.to_string(), "path" => path.clone())
        .increment(1);

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.clone(),
        "status" => status.as_u16().to_string()
    )
    .record(duration.as_secs_f64());

    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    if status.is_server_error() {
        counter!(
            "http_errors_total",
            "method" => method.to_string(),
            "path" => path,
            "status" => status.as_u16().to_string()
        )
        .increment(1);
    }

    response
}

/// Middleware to track in-flight requests
pub async fn active_requests_middleware(request: Request, next: Next) -> Response {
    gauge!("http_requests_in_flight").increment(1.0);
    let response = next.run(request).await;
    gauge!("http_requests_in_flight").decrement(1.0);
    response
}

/// Track bid mutations rejected by the per-user limiter
pub fn track_rate_limit_hit(operation: &str) {
    counter!("rate_limit_hits_total", "operation" => operation.to_string()).increment(1);
}

/// Track open notification streams
pub fn track_stream_connection(connected: bool) {
    if connected {
        gauge!("notification_streams_active").increment(1.0);
    } else {
        gauge!("notification_streams_active").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trackers_without_recorder() {
        track_rate_limit_hit("submit");
        track_stream_connection(true);
        track_stream_connection(false);
    }
}
