use dashmap::DashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

pub mod repository;

pub use repository::{PagedResult, Pagination};

use crate::models::{Bid, Payment, PaymentHistory, Refund, Settlement, Trade};

/// Monotonic id source for one table
#[derive(Debug)]
pub struct Sequence(AtomicI64);

impl Default for Sequence {
    fn default() -> Self {
        Self(AtomicI64::new(1))
    }
}

impl Sequence {
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Tables of the in-process store
#[derive(Default)]
pub struct Tables {
    pub bids: DashMap<i64, Bid>,
    pub trades: DashMap<i64, Trade>,
    pub payments: DashMap<i64, Payment>,
    pub payment_history: DashMap<i64, Vec<PaymentHistory>>,
    pub refunds: DashMap<i64, Refund>,
    pub settlements: DashMap<i64, Settlement>,

    /// bid id -> id of the WAITING_PAYMENT or completed trade it belongs to
    pub active_trade_by_bid: DashMap<i64, i64>,
    pub payment_by_trade: DashMap<i64, i64>,
    pub settlement_by_trade: DashMap<i64, i64>,

    pub bid_seq: Sequence,
    pub trade_seq: Sequence,
    pub payment_seq: Sequence,
    pub refund_seq: Sequence,
    pub settlement_seq: Sequence,
}

/// Shared handle to the system of record
#[derive(Clone, Default)]
pub struct Store {
    tables: Arc<Tables>,
}

impl Deref for Store {
    type Target = Tables;

    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

impl Store {
    pub fn new() -> Self {
        info!("Initializing in-memory exchange store");
        Self::default()
    }

    pub fn bid(&self, id: i64) -> Option<Bid> {
        self.bids.get(&id).map(|b| b.clone())
    }

    pub fn trade(&self, id: i64) -> Option<Trade> {
        self.trades.get(&id).map(|t| t.clone())
    }

    pub fn payment(&self, id: i64) -> Option<Payment> {
        self.payments.get(&id).map(|p| p.clone())
    }

    pub fn settlement(&self, id: i64) -> Option<Settlement> {
        self.settlements.get(&id).map(|s| s.clone())
    }

    pub fn active_trade_for_bid(&self, bid_id: i64) -> Option<Trade> {
        let trade_id = *self.active_trade_by_bid.get(&bid_id)?;
        self.trade(trade_id)
    }

    pub fn payment_for_trade(&self, trade_id: i64) -> Option<Payment> {
        let payment_id = *self.payment_by_trade.get(&trade_id)?;
        self.payment(payment_id)
    }

    pub fn settlement_for_trade(&self, trade_id: i64) -> Option<Settlement> {
        let settlement_id = *self.settlement_by_trade.get(&trade_id)?;
        self.settlement(settlement_id)
    }

    pub fn append_payment_history(&self, entry: PaymentHistory) {
        self.payment_history
            .entry(entry.payment_id)
            .or_default()
            .push(entry);
    }

    pub fn payment_history_for(&self, payment_id: i64) -> Vec<PaymentHistory> {
        self.payment_history
            .get(&payment_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Snapshot of bids matching `filter`, newest first
    pub fn bids_where<F>(&self, filter: F) -> Vec<Bid>
    where
        F: Fn(&Bid) -> bool,
    {
        let mut rows: Vec<Bid> = self
            .bids
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    /// Snapshot of trades matching `filter`, newest first
    pub fn trades_where<F>(&self, filter: F) -> Vec<Trade>
    where
        F: Fn(&Trade) -> bool,
    {
        let mut rows: Vec<Trade> = self
            .trades
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| b.matched_at.cmp(&a.matched_at).then(b.id.cmp(&a.id)));
        rows
    }

    /// Snapshot of settlements matching `filter`, newest first
    pub fn settlements_where<F>(&self, filter: F) -> Vec<Settlement>
    where
        F: Fn(&Settlement) -> bool,
    {
        let mut rows: Vec<Settlement> = self
            .settlements
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_independent_and_monotonic() {
        let store = Store::new();
        assert_eq!(store.bid_seq.next(), 1);
        assert_eq!(store.bid_seq.next(), 2);
        assert_eq!(store.trade_seq.next(), 1);
    }

    #[test]
    fn test_clones_share_tables() {
        let store = Store::new();
        let other = store.clone();
        let id = store.payment_seq.next();
        other.payment_by_trade.insert(7, id);
        assert_eq!(store.payment_by_trade.get(&7).map(|v| *v), Some(id));
    }
}
