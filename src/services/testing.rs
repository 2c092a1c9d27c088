// Fully wired services over an in-memory store for unit tests

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::database::Store;
use crate::models::bid::BidRequest;
use crate::models::payment::CompletePaymentRequest;
use crate::models::{BidType, Payment, Trade};
use crate::services::{
    AdminService, AuditLogger, Catalog, MockPaymentGateway, NotificationDispatcher,
    OrderBookService, PaymentService, PenaltyRegistry, SettlementService, TradeLifecycle,
};
use crate::startup::build_state;

pub(crate) struct Harness {
    pub store: Store,
    pub catalog: Catalog,
    pub order_book: OrderBookService,
    pub trades: TradeLifecycle,
    pub payments: PaymentService,
    pub settlements: SettlementService,
    pub notifications: NotificationDispatcher,
    pub admin: AdminService,
    pub audit: AuditLogger,
    pub penalties: PenaltyRegistry,
    pub gateway: MockPaymentGateway,
}

pub(crate) fn test_config() -> Config {
    let mut config = Config {
        jwt_secret: "unit-test-secret".to_string(),
        environment: "test".to_string(),
        ..Config::default()
    };
    config.lock.wait = Duration::from_millis(200);
    config.lock.retry_delay = Duration::from_millis(5);
    config.payment.retry_delay_ms = 1;
    config.matching.sweep_on_startup = false;
    config
}

impl Harness {
    pub fn new() -> Self {
        let gateway = MockPaymentGateway::new();
        let state = build_state(test_config(), Arc::new(gateway.clone()), None)
            .expect("test state should build");

        Self {
            store: state.store,
            catalog: state.catalog,
            order_book: state.order_book,
            trades: state.trades,
            payments: state.payments,
            settlements: state.settlements,
            notifications: state.notifications,
            admin: state.admin,
            audit: state.audit_logger,
            penalties: state.penalties,
            gateway,
        }
    }

    /// Buyer 1 and seller 2 crossing on option 3 at `price`
    pub async fn matched_trade(&self, price: i64) -> Trade {
        self.order_book
            .submit(
                1,
                BidRequest {
                    product_option_id: 3,
                    price,
                    bid_type: BidType::Buy,
                },
            )
            .await
            .expect("buy bid accepted");
        let sell = self
            .order_book
            .submit(
                2,
                BidRequest {
                    product_option_id: 3,
                    price,
                    bid_type: BidType::Sell,
                },
            )
            .await
            .expect("sell bid accepted");
        let trade_id = sell.trade_id.expect("bids should cross");
        self.store.trade(trade_id).expect("trade stored")
    }

    /// A matched trade paid through the mock provider, settlement still pending
    pub async fn paid_trade(&self, price: i64) -> (Trade, Payment) {
        let trade = self.matched_trade(price).await;
        let prepared = self
            .payments
            .prepare(trade.buyer_id, trade.id)
            .await
            .expect("prepare");
        self.payments
            .complete(
                trade.buyer_id,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: format!("imp_{}", trade.id),
                    merchant_uid: prepared.payment_id,
                },
            )
            .await
            .expect("complete");

        let trade = self.store.trade(trade.id).expect("trade stored");
        let payment = self.store.payment(prepared.id).expect("payment stored");
        (trade, payment)
    }
}
