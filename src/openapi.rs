//! OpenAPI document served under `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ErrorCode, ErrorDetail, ErrorResponse};
use crate::handlers::{self, response::PagingInfo};
use crate::models::admin::{
    AdminBidCancelResponse, AdminCancelRequest, BidMonitorRow, SweepResponse, TradeMonitorRow,
};
use crate::models::bid::{BidCancelResponse, BidRequest, BidResponse};
use crate::models::notification::NotificationCursorPage;
use crate::models::payment::{
    CompletePaymentRequest, CompletePaymentResponse, PreparePaymentRequest,
    PreparePaymentResponse, RefundRequest, RefundResponse,
};
use crate::models::trade::{TradeCancelResponse, TradeResponse};
use crate::models::{
    BidStatus, BidType, CancelReason, Notification, NotificationKind, PaymentHistory,
    PaymentStatus, Refund, Settlement, SettlementStatus, TradeRole, TradeStatus,
};
use crate::services::health_check::{
    DependencyHealth, DetailedHealthStatus, ExchangeStats, HealthCheckStatus,
};
use crate::services::AuditEventRecord;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Resale Exchange API",
        version = "1.0.0",
        description = "Bid matching, trade settlement and notifications for a resale marketplace"
    ),
    paths(
        handlers::health::liveness,
        handlers::health::health_check,
        handlers::health::exchange_stats,
        handlers::metrics::get_prometheus_metrics,
        handlers::bids::create_bid,
        handlers::bids::amend_bid,
        handlers::bids::withdraw_bid,
        handlers::bids::market_depth,
        handlers::bids::my_bids,
        handlers::trades::cancel_trade,
        handlers::trades::get_trade,
        handlers::trades::my_trades,
        handlers::payments::prepare_payment,
        handlers::payments::complete_payment,
        handlers::payments::refund_payment,
        handlers::payments::payment_history,
        handlers::settlements::list_settlements,
        handlers::settlements::get_settlement,
        handlers::notifications::list_notifications,
        handlers::notifications::mark_as_read,
        handlers::notifications::unread_count,
        handlers::notifications::subscribe,
        handlers::admin::monitor_bids,
        handlers::admin::force_cancel_bid,
        handlers::admin::monitor_trades,
        handlers::admin::force_cancel_trade,
        handlers::admin::matching_sweep,
        handlers::admin::audit_log,
    ),
    components(schemas(
        ErrorCode,
        ErrorResponse,
        ErrorDetail,
        PagingInfo,
        BidType,
        BidStatus,
        CancelReason,
        BidRequest,
        BidResponse,
        BidCancelResponse,
        TradeStatus,
        TradeRole,
        TradeResponse,
        TradeCancelResponse,
        PaymentStatus,
        PaymentHistory,
        Refund,
        PreparePaymentRequest,
        PreparePaymentResponse,
        CompletePaymentRequest,
        CompletePaymentResponse,
        RefundRequest,
        RefundResponse,
        SettlementStatus,
        Settlement,
        NotificationKind,
        Notification,
        NotificationCursorPage,
        handlers::notifications::UnreadCountResponse,
        AdminCancelRequest,
        AdminBidCancelResponse,
        BidMonitorRow,
        TradeMonitorRow,
        SweepResponse,
        AuditEventRecord,
        handlers::health::HealthResponse,
        DetailedHealthStatus,
        DependencyHealth,
        HealthCheckStatus,
        ExchangeStats,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "bids", description = "Order book"),
        (name = "trades", description = "Matched trades"),
        (name = "payments", description = "Buyer payments and refunds"),
        (name = "settlements", description = "Seller payouts"),
        (name = "notifications", description = "Pull and SSE notifications"),
        (name = "admin", description = "Monitoring and override"),
        (name = "health", description = "Probes"),
        (name = "metrics", description = "Prometheus")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_exchange_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/v1/bids"));
        assert!(paths.contains_key("/v1/bids/{id}"));
        assert!(paths.contains_key("/v1/payments/prepare"));
        assert!(paths.contains_key("/v1/admin/matching/sweep"));
        assert!(paths.contains_key("/v1/notification/subscribe"));
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
