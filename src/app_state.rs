//! Application state shared across all handlers.
//!
//! This module defines the `AppState` struct which holds every service the
//! exchange needs to process API requests.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::auth::jwt::JwtService;
use crate::config::Config;
use crate::database::Store;
use crate::services;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// System of record for bids, trades, payments and settlements
    pub store: Store,
    /// Categories, products, options and known users
    pub catalog: services::Catalog,
    /// JWT authentication service
    pub jwt_service: JwtService,
    /// Bid registration, amendment, withdrawal and market depth
    pub order_book: services::OrderBookService,
    /// Trade cancellation, expiry and queries
    pub trades: services::TradeLifecycle,
    /// Payment preparation and verification
    pub payments: services::PaymentService,
    /// Seller payouts and refunds
    pub settlements: services::SettlementService,
    /// Pull and push notification delivery
    pub notifications: services::NotificationDispatcher,
    /// Admin override and monitoring
    pub admin: services::AdminService,
    /// Audit logging service
    pub audit_logger: services::AuditLogger,
    pub penalties: services::PenaltyRegistry,
    pub rate_limiter: services::BidRateLimiter,
    /// Named per-trade locks
    pub locks: services::KeyedLocks,
    /// Health check service
    pub health_checker: services::HealthChecker,
    /// Prometheus render handle, absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl axum::extract::FromRef<AppState> for services::HealthChecker {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.health_checker.clone()
    }
}

impl axum::extract::FromRef<AppState> for services::NotificationDispatcher {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notifications.clone()
    }
}
