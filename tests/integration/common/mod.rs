// Shared setup for the integration suites
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use resale_exchange::models::bid::BidRequest;
use resale_exchange::models::BidType;
use resale_exchange::services::MockPaymentGateway;
use resale_exchange::startup::build_state;
use resale_exchange::{AppState, Config};

pub const OPTION: i64 = 3;

pub fn test_config() -> Config {
    let mut config = Config {
        jwt_secret: "integration-test-secret".to_string(),
        environment: "test".to_string(),
        ..Config::default()
    };
    config.lock.wait = Duration::from_millis(500);
    config.lock.retry_delay = Duration::from_millis(5);
    config.payment.retry_delay_ms = 1;
    config.matching.sweep_on_startup = false;
    config
}

/// Fully wired state over the in-memory store and the mock provider
pub fn test_state() -> (AppState, MockPaymentGateway) {
    let gateway = MockPaymentGateway::new();
    let state = build_state(test_config(), Arc::new(gateway.clone()), None)
        .expect("state should build");
    (state, gateway)
}

pub fn buy(price: i64) -> BidRequest {
    BidRequest {
        product_option_id: OPTION,
        price,
        bid_type: BidType::Buy,
    }
}

pub fn sell(price: i64) -> BidRequest {
    BidRequest {
        product_option_id: OPTION,
        price,
        bid_type: BidType::Sell,
    }
}
