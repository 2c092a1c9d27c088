//! Price-time priority matching for one option book.
//!
//! Every function here runs while the caller holds the option's shard lock, so
//! reading the two bids, flipping them to MATCHED and recording the trade is a
//! single critical section per option.

use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info};

use crate::database::Store;
use crate::models::{
    BidStatus, BidType, NewNotification, NotificationKind, Trade, TradeStatus,
};
use crate::services::catalog::Catalog;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::services::order_book::OptionBook;

#[derive(Clone)]
pub struct MatchingEngine {
    store: Store,
    catalog: Catalog,
    notifications: NotificationDispatcher,
}

impl MatchingEngine {
    pub fn new(store: Store, catalog: Catalog, notifications: NotificationDispatcher) -> Self {
        Self {
            store,
            catalog,
            notifications,
        }
    }

    /// Try to pair `incoming_id` with the best eligible resting bid on the opposite side.
    ///
    /// At most one trade is created. The trade takes the resting bid's price.
    pub fn match_incoming(&self, book: &mut OptionBook, incoming_id: i64) -> Option<Trade> {
        let started = Instant::now();

        let incoming = match self.store.bid(incoming_id) {
            Some(bid) if bid.is_pending() && bid.product_option_id == book.option_id() => bid,
            _ => {
                book.remove(incoming_id);
                return None;
            }
        };

        let mut stale = Vec::new();
        let mut chosen = None;
        for key in book.side(incoming.bid_type.opposite()).iter() {
            let candidate = match self.store.bid(key.bid_id) {
                Some(c) if c.is_pending() && c.product_option_id == book.option_id() => c,
                _ => {
                    stale.push(key.bid_id);
                    continue;
                }
            };
            if candidate.user_id == incoming.user_id {
                continue;
            }
            if !incoming.crosses(candidate.price) {
                // queue is price ordered, nothing further can cross
                break;
            }
            chosen = Some(candidate);
            break;
        }

        for id in stale {
            debug!(bid_id = id, option_id = book.option_id(), "Dropping stale queue entry");
            book.remove(id);
        }

        let resting = chosen?;
        let now = Utc::now();
        let (buy, sell) = match incoming.bid_type {
            BidType::Buy => (&incoming, &resting),
            BidType::Sell => (&resting, &incoming),
        };

        let trade = Trade {
            id: self.store.trade_seq.next(),
            buy_bid_id: buy.id,
            sell_bid_id: sell.id,
            buyer_id: buy.user_id,
            seller_id: sell.user_id,
            product_option_id: book.option_id(),
            price: resting.price,
            status: TradeStatus::WaitingPayment,
            matched_at: now,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        };

        for id in [buy.id, sell.id] {
            if let Some(mut bid) = self.store.bids.get_mut(&id) {
                bid.status = BidStatus::Matched;
                bid.updated_at = now;
            }
            book.remove(id);
            self.store.active_trade_by_bid.insert(id, trade.id);
        }
        self.store.trades.insert(trade.id, trade.clone());

        info!(
            trade_id = trade.id,
            option_id = trade.product_option_id,
            buy_bid_id = trade.buy_bid_id,
            sell_bid_id = trade.sell_bid_id,
            price = trade.price,
            "Bids matched"
        );
        metrics::counter!("trades_created_total").increment(1);
        metrics::counter!("bids_matched_total").increment(2);
        metrics::histogram!("matching_duration_seconds").record(started.elapsed().as_secs_f64());

        self.notify_matched(&trade);
        Some(trade)
    }

    /// Keep matching queued bids until no crossing pair remains
    pub fn sweep(&self, book: &mut OptionBook) -> Vec<Trade> {
        let mut trades = Vec::new();
        loop {
            let mut progressed = false;
            for side in [BidType::Buy, BidType::Sell] {
                for id in book.ids(side) {
                    if let Some(trade) = self.match_incoming(book, id) {
                        trades.push(trade);
                        progressed = true;
                        break;
                    }
                }
                if progressed {
                    break;
                }
            }
            if !progressed {
                return trades;
            }
        }
    }

    fn notify_matched(&self, trade: &Trade) {
        let label = self.catalog.option_label(trade.product_option_id);
        self.notifications.send_all(vec![
            NewNotification::new(
                trade.buyer_id,
                NotificationKind::TradeMatched,
                "Your bid was matched",
                format!(
                    "{} matched at {}. Please complete payment.",
                    label, trade.price
                ),
            )
            .with_trade(trade.id),
            NewNotification::new(
                trade.seller_id,
                NotificationKind::TradeMatched,
                "Your ask was matched",
                format!("{} matched at {}. Awaiting buyer payment.", label, trade.price),
            )
            .with_trade(trade.id),
        ]);
    }
}
