// Racing requests against the same option and the same trade

mod common;

use std::collections::HashSet;

use futures::future::join_all;
use resale_exchange::models::payment::CompletePaymentRequest;
use resale_exchange::models::{BidStatus, TradeStatus};

use common::{buy, sell, test_state};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_buyers_race_for_one_seller() {
    let (state, _) = test_state();
    let resting = state.order_book.submit(1, sell(100_000)).await.unwrap();

    let handles: Vec<_> = [2_i64, 3]
        .into_iter()
        .map(|user| {
            let book = state.order_book.clone();
            tokio::spawn(async move { book.submit(user, buy(100_000)).await })
        })
        .collect();

    let responses: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("bid accepted"))
        .collect();

    let matched: Vec<_> = responses.iter().filter(|r| r.trade_id.is_some()).collect();
    assert_eq!(matched.len(), 1);

    let loser = responses.iter().find(|r| r.trade_id.is_none()).unwrap();
    assert_eq!(state.store.bid(loser.id).unwrap().status, BidStatus::Pending);
    assert_eq!(state.store.bid(resting.id).unwrap().status, BidStatus::Matched);
    assert_eq!(state.store.trades.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_bid_is_traded_twice_under_load() {
    let (state, _) = test_state();

    let mut handles = Vec::new();
    for n in 0..20_i64 {
        let book = state.order_book.clone();
        // sellers 100..119, buyers 200..219
        let (user, request) = if n % 2 == 0 {
            (100 + n, sell(100_000))
        } else {
            (200 + n, buy(100_000))
        };
        handles.push(tokio::spawn(async move { book.submit(user, request).await }));
    }
    for joined in join_all(handles).await {
        joined.expect("task panicked").expect("bid accepted");
    }

    let trades: Vec<_> = state.store.trades.iter().map(|t| t.value().clone()).collect();
    assert_eq!(trades.len(), 10);

    let mut seen = HashSet::new();
    for trade in &trades {
        assert!(seen.insert(trade.buy_bid_id), "buy bid traded twice");
        assert!(seen.insert(trade.sell_bid_id), "sell bid traded twice");
        assert_ne!(trade.buyer_id, trade.seller_id);
    }
    assert!(state.order_book.depth(common::OPTION).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_payment_race_has_one_winner() {
    let (state, _) = test_state();
    state.order_book.submit(1, sell(90_000)).await.unwrap();
    let trade_id = state
        .order_book
        .submit(2, buy(90_000))
        .await
        .unwrap()
        .trade_id
        .unwrap();
    let prepared = state.payments.prepare(2, trade_id).await.unwrap();

    let payments = state.payments.clone();
    let pay = tokio::spawn(async move {
        payments
            .complete(
                2,
                prepared.id,
                CompletePaymentRequest {
                    imp_uid: "imp_race".to_string(),
                    merchant_uid: prepared.payment_id,
                },
            )
            .await
    });
    let trades = state.trades.clone();
    let cancel = tokio::spawn(async move { trades.cancel(trade_id, 1).await });

    let paid = pay.await.unwrap();
    let cancelled = cancel.await.unwrap();
    assert!(paid.is_ok() ^ cancelled.is_ok());

    let trade = state.store.trade(trade_id).unwrap();
    if paid.is_ok() {
        assert_eq!(trade.status, TradeStatus::PaymentCompleted);
        assert!(state.store.settlement_for_trade(trade_id).is_some());
    } else {
        assert_eq!(trade.status, TradeStatus::PaymentCanceled);
        assert!(state.store.settlement_for_trade(trade_id).is_none());
    }
}
