// Business logic services
// Order book, matching, trade lifecycle, payments, settlement, notifications

pub mod admin;
pub mod audit_logger;
pub mod catalog;
pub mod health_check;
pub mod lock;
pub mod matching_engine;
pub mod notification_dispatcher;
pub mod order_book;
pub mod payment;
pub mod penalty;
pub mod rate_limiter;
pub mod settlement;
pub mod trade_lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::AdminService;
pub use audit_logger::{AuditEvent, AuditEventRecord, AuditLogger};
pub use catalog::Catalog;
pub use health_check::HealthChecker;
pub use lock::{KeyedLocks, LockConfig};
pub use matching_engine::MatchingEngine;
pub use notification_dispatcher::NotificationDispatcher;
pub use order_book::{OrderBook, OrderBookService};
pub use payment::gateway::{MockPaymentGateway, PaymentGateway};
pub use payment::portone::PortOneClient;
pub use payment::PaymentService;
pub use penalty::PenaltyRegistry;
pub use rate_limiter::BidRateLimiter;
pub use settlement::SettlementService;
pub use trade_lifecycle::TradeLifecycle;
