// End-to-end trading flows driven through the wired services:
// matching, payment, settlement, cancellation penalties and admin override.

mod common;

use chrono::Utc;
use resale_exchange::error::ErrorCode;
use resale_exchange::models::admin::AdminCancelRequest;
use resale_exchange::models::bid::BidRequest;
use resale_exchange::models::payment::{CompletePaymentRequest, RefundRequest};
use resale_exchange::models::{
    BidStatus, BidType, NotificationKind, PaymentStatus, SettlementStatus, TradeStatus,
};
use resale_exchange::auth::Actor;
use resale_exchange::database::Pagination;

use common::{buy, sell, test_state};

const BUYER: i64 = 10;
const SELLER: i64 = 20;
const ADMIN: i64 = 99;

#[tokio::test]
async fn test_match_pay_and_settle() {
    let (state, gateway) = test_state();

    let resting = state.order_book.submit(SELLER, sell(100_000)).await.unwrap();
    assert_eq!(resting.status, BidStatus::Pending);
    assert!(resting.trade_id.is_none());

    let incoming = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();
    assert_eq!(incoming.status, BidStatus::Matched);
    let trade_id = incoming.trade_id.expect("bids should cross");

    let trade = state.trades.get(trade_id, BUYER).unwrap();
    assert_eq!(trade.status, TradeStatus::WaitingPayment);
    assert_eq!(trade.price, 100_000);

    let prepared = state.payments.prepare(BUYER, trade_id).await.unwrap();
    assert_eq!(prepared.amount, 100_000);
    assert_eq!(prepared.status, PaymentStatus::Prepared);

    let completed = state
        .payments
        .complete(
            BUYER,
            prepared.id,
            CompletePaymentRequest {
                imp_uid: "imp_flow_1".to_string(),
                merchant_uid: prepared.payment_id.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status, PaymentStatus::Paid);
    assert_eq!(
        state.trades.get(trade_id, SELLER).unwrap().status,
        TradeStatus::PaymentCompleted
    );

    let settlement = state.store.settlement(completed.settlement_id).unwrap();
    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert_eq!(settlement.fee_amount, 10_000);
    assert_eq!(settlement.settlement_amount, 90_000);

    assert_eq!(state.settlements.process_pending(Utc::now()).await, 1);
    let settled = state
        .settlements
        .get_for_user(completed.settlement_id, Actor::user(SELLER))
        .unwrap();
    assert_eq!(settled.status, SettlementStatus::Completed);
    assert!(settled.settled_at.is_some());

    let seller_kinds: Vec<NotificationKind> = state
        .notifications
        .list_after(SELLER, None, 50)
        .items
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(seller_kinds.contains(&NotificationKind::TradeMatched));
    assert!(seller_kinds.contains(&NotificationKind::SettlementCompleted));

    // nothing left to refund through the provider yet
    assert_eq!(gateway.cancelled_amount(&prepared.payment_id), None);
}

#[tokio::test]
async fn test_best_price_wins_at_resting_price() {
    let (state, _) = test_state();

    let expensive = state.order_book.submit(21, sell(140_000)).await.unwrap();
    let cheap = state.order_book.submit(22, sell(120_000)).await.unwrap();

    let incoming = state.order_book.submit(BUYER, buy(150_000)).await.unwrap();
    let trade = state.store.trade(incoming.trade_id.unwrap()).unwrap();

    assert_eq!(trade.sell_bid_id, cheap.id);
    assert_eq!(trade.price, 120_000);
    assert_eq!(
        state.store.bid(expensive.id).unwrap().status,
        BidStatus::Pending
    );
}

#[tokio::test]
async fn test_own_bids_never_cross() {
    let (state, _) = test_state();

    state.order_book.submit(BUYER, sell(100_000)).await.unwrap();
    let own = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();

    assert!(own.trade_id.is_none());
    assert_eq!(state.order_book.depth(common::OPTION).unwrap().len(), 2);
}

#[tokio::test]
async fn test_buyer_cancel_penalises_and_reopens_seller_bid() {
    let (state, _) = test_state();

    let resting = state.order_book.submit(SELLER, sell(100_000)).await.unwrap();
    let incoming = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();
    let trade_id = incoming.trade_id.unwrap();

    let cancelled = state.trades.cancel(trade_id, BUYER).await.unwrap();
    assert_eq!(cancelled.status, TradeStatus::PaymentCanceled);
    assert!(cancelled.penalty_until.is_some());

    let err = state.order_book.submit(BUYER, buy(90_000)).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PenaltyActive);

    assert_eq!(
        state.store.bid(resting.id).unwrap().status,
        BidStatus::Pending
    );

    let rematched = state.order_book.submit(11, buy(100_000)).await.unwrap();
    let trade = state.store.trade(rematched.trade_id.unwrap()).unwrap();
    assert_eq!(trade.sell_bid_id, resting.id);

    // second cancel of a closed trade
    let err = state.trades.cancel(trade_id, SELLER).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::TradeNotCancellable);
}

#[tokio::test]
async fn test_seller_refund_before_payout() {
    let (state, gateway) = test_state();

    state.order_book.submit(SELLER, sell(80_000)).await.unwrap();
    let incoming = state.order_book.submit(BUYER, buy(80_000)).await.unwrap();
    let trade_id = incoming.trade_id.unwrap();
    let prepared = state.payments.prepare(BUYER, trade_id).await.unwrap();
    state
        .payments
        .complete(
            BUYER,
            prepared.id,
            CompletePaymentRequest {
                imp_uid: "imp_refund".to_string(),
                merchant_uid: prepared.payment_id.clone(),
            },
        )
        .await
        .unwrap();

    let request = || RefundRequest {
        trade_id: Some(trade_id),
        reason: "item damaged".to_string(),
        amount: 80_000,
    };

    let err = state
        .payments
        .refund(prepared.id, Actor::user(BUYER), request())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotOwner);

    let refunded = state
        .payments
        .refund(prepared.id, Actor::user(SELLER), request())
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert!(!refunded.already_refunded);
    assert_eq!(gateway.cancelled_amount(&prepared.payment_id), Some(80_000));

    let again = state
        .payments
        .refund(prepared.id, Actor::user(SELLER), request())
        .await
        .unwrap();
    assert!(again.already_refunded);
    assert_eq!(gateway.cancelled_amount(&prepared.payment_id), Some(80_000));

    let settlement = state.store.settlement_for_trade(trade_id).unwrap();
    assert_eq!(settlement.status, SettlementStatus::Refunded);
    assert_eq!(state.settlements.process_pending(Utc::now()).await, 0);
}

#[tokio::test]
async fn test_admin_force_cancel_is_audited() {
    let (state, _) = test_state();

    let bid = state.order_book.submit(SELLER, sell(70_000)).await.unwrap();
    let response = state
        .admin
        .force_cancel_bid(
            ADMIN,
            bid.id,
            AdminCancelRequest {
                reason_code: "FRAUD".to_string(),
                comment: "counterfeit listing".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status, BidStatus::Cancelled);
    assert_eq!(response.cancelled_by, ADMIN);

    let err = state
        .admin
        .force_cancel_bid(
            ADMIN,
            bid.id,
            AdminCancelRequest {
                reason_code: "FRAUD".to_string(),
                comment: "again".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);

    let records = state.admin.audit_log(Some("bid_force_cancelled"), 10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor_id, Some(ADMIN));

    let owner_kinds: Vec<NotificationKind> = state
        .notifications
        .list(SELLER, &Pagination::new(0, 10))
        .items
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(owner_kinds.contains(&NotificationKind::BidCancelled));
}

#[tokio::test]
async fn test_admin_trade_cancel_closes_both_bids_without_penalty() {
    let (state, _) = test_state();

    let resting = state.order_book.submit(SELLER, sell(60_000)).await.unwrap();
    let incoming = state.order_book.submit(BUYER, buy(60_000)).await.unwrap();
    let trade_id = incoming.trade_id.unwrap();

    let response = state
        .admin
        .force_cancel_trade(
            ADMIN,
            trade_id,
            AdminCancelRequest {
                reason_code: "POLICY_VIOLATION".to_string(),
                comment: "off-platform payment attempt".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status, TradeStatus::PaymentCanceled);
    assert!(response.penalty_until.is_none());

    assert_eq!(state.store.bid(resting.id).unwrap().status, BidStatus::Cancelled);
    assert_eq!(state.store.bid(incoming.id).unwrap().status, BidStatus::Cancelled);

    // neither party is blocked
    assert!(state.order_book.submit(BUYER, buy(55_000)).await.is_ok());
    assert!(state.order_book.submit(SELLER, sell(65_000)).await.is_ok());
}

#[tokio::test]
async fn test_amend_crossing_the_book_matches_at_resting_price() {
    let (state, _) = test_state();

    let resting = state.order_book.submit(SELLER, sell(480_000)).await.unwrap();
    let low = state.order_book.submit(BUYER, buy(400_000)).await.unwrap();
    assert!(low.trade_id.is_none());

    let amended = state
        .order_book
        .amend(BUYER, low.id, buy(500_000))
        .await
        .unwrap();
    assert_eq!(amended.status, BidStatus::Matched);
    assert_eq!(amended.price, 500_000);

    let trade = state.store.trade(amended.trade_id.unwrap()).unwrap();
    assert_eq!(trade.price, 480_000);
    assert_eq!(trade.buy_bid_id, low.id);
    assert_eq!(trade.sell_bid_id, resting.id);
    assert_eq!(state.store.bid(resting.id).unwrap().status, BidStatus::Matched);
}

#[tokio::test]
async fn test_amend_moves_bid_to_another_option() {
    let (state, _) = test_state();
    let other = BidRequest {
        product_option_id: 4,
        price: 150_000,
        bid_type: BidType::Buy,
    };

    let resting = state
        .order_book
        .submit(
            SELLER,
            BidRequest {
                product_option_id: 4,
                price: 140_000,
                bid_type: BidType::Sell,
            },
        )
        .await
        .unwrap();
    let bid = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();

    let amended = state.order_book.amend(BUYER, bid.id, other).await.unwrap();
    assert_eq!(amended.product_option_id, 4);
    assert_eq!(amended.status, BidStatus::Matched);

    let trade = state.store.trade(amended.trade_id.unwrap()).unwrap();
    assert_eq!(trade.product_option_id, 4);
    assert_eq!(trade.sell_bid_id, resting.id);
    assert_eq!(trade.price, 140_000);
    assert!(state.order_book.depth(common::OPTION).unwrap().is_empty());
}

#[tokio::test]
async fn test_amend_can_flip_bid_side() {
    let (state, _) = test_state();

    let waiting_buyer = state.order_book.submit(BUYER, buy(200_000)).await.unwrap();
    let bid = state.order_book.submit(SELLER, buy(150_000)).await.unwrap();
    assert!(bid.trade_id.is_none());

    let flipped = state
        .order_book
        .amend(SELLER, bid.id, sell(190_000))
        .await
        .unwrap();
    assert_eq!(flipped.bid_type, BidType::Sell);
    assert_eq!(flipped.status, BidStatus::Matched);

    let trade = state.store.trade(flipped.trade_id.unwrap()).unwrap();
    assert_eq!(trade.buy_bid_id, waiting_buyer.id);
    assert_eq!(trade.sell_bid_id, bid.id);
    assert_eq!(trade.price, 200_000);
}

#[tokio::test]
async fn test_amend_rejections() {
    let (state, _) = test_state();

    let bid = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();
    let err = state
        .order_book
        .amend(SELLER, bid.id, buy(110_000))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotOwner);

    state.order_book.submit(SELLER, sell(100_000)).await.unwrap();
    assert_eq!(state.store.bid(bid.id).unwrap().status, BidStatus::Matched);
    let err = state
        .order_book
        .amend(BUYER, bid.id, buy(120_000))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);

    let withdrawn = state.order_book.submit(BUYER, buy(50_000)).await.unwrap();
    state.order_book.withdraw(BUYER, withdrawn.id).await.unwrap();
    let err = state
        .order_book
        .amend(BUYER, withdrawn.id, buy(60_000))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn test_withdraw_pending_bid_once() {
    let (state, _) = test_state();

    let bid = state.order_book.submit(SELLER, sell(300_000)).await.unwrap();
    let err = state.order_book.withdraw(BUYER, bid.id).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NotOwner);

    let withdrawn = state.order_book.withdraw(SELLER, bid.id).await.unwrap();
    assert_eq!(withdrawn.status, BidStatus::Cancelled);
    assert!(withdrawn.cancelled_at.is_some());
    assert!(state.order_book.depth(common::OPTION).unwrap().is_empty());

    let err = state.order_book.withdraw(SELLER, bid.id).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);

    // a withdrawn sell no longer crosses
    let late = state.order_book.submit(BUYER, buy(300_000)).await.unwrap();
    assert!(late.trade_id.is_none());
}

#[tokio::test]
async fn test_withdraw_matched_bid_needs_trade_cancel() {
    let (state, _) = test_state();

    state.order_book.submit(SELLER, sell(100_000)).await.unwrap();
    let bid = state.order_book.submit(BUYER, buy(100_000)).await.unwrap();
    let trade_id = bid.trade_id.unwrap();

    let err = state.order_book.withdraw(BUYER, bid.id).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidState);
    assert_eq!(
        state.store.trade(trade_id).unwrap().status,
        TradeStatus::WaitingPayment
    );

    let cancelled = state.trades.cancel_for_bid(bid.id, BUYER).await.unwrap();
    assert_eq!(cancelled.trade_id, trade_id);
    assert_eq!(cancelled.status, TradeStatus::PaymentCanceled);
    assert!(cancelled.penalty_until.is_some());
    assert_eq!(state.store.bid(bid.id).unwrap().status, BidStatus::Cancelled);
}
