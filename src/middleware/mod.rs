// Middleware module - request logging and HTTP metrics

pub mod metrics;
pub mod request_logger;

pub use metrics::{active_requests_middleware, metrics_middleware};
pub use request_logger::request_logger_middleware;
