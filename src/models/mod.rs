// Domain records and API request/response models

pub mod admin;
pub mod bid;
pub mod catalog;
pub mod notification;
pub mod payment;
pub mod penalty;
pub mod settlement;
pub mod trade;

pub use bid::{Bid, BidStatus, BidType, CancelReason};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use payment::{Payment, PaymentHistory, PaymentStatus, Refund};
pub use penalty::Penalty;
pub use settlement::{Settlement, SettlementStatus};
pub use trade::{Trade, TradeRole, TradeStatus};
