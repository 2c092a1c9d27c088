use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::models::{Bid, BidType};

/// Priority key of a queued bid. `rank` is `-price` for BUY and `price` for SELL,
/// so ascending key order is best price first, then oldest, then lowest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    rank: i64,
    created_at: DateTime<Utc>,
    pub bid_id: i64,
}

impl QueueKey {
    pub fn for_bid(bid: &Bid) -> Self {
        let rank = match bid.bid_type {
            BidType::Buy => -bid.price,
            BidType::Sell => bid.price,
        };
        Self {
            rank,
            created_at: bid.created_at,
            bid_id: bid.id,
        }
    }
}

/// BUY and SELL queues of PENDING bids for one product option
#[derive(Debug)]
pub struct OptionBook {
    option_id: i64,
    buys: BTreeSet<QueueKey>,
    sells: BTreeSet<QueueKey>,
    index: FxHashMap<i64, (BidType, QueueKey)>,
}

impl OptionBook {
    pub fn new(option_id: i64) -> Self {
        Self {
            option_id,
            buys: BTreeSet::new(),
            sells: BTreeSet::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn option_id(&self) -> i64 {
        self.option_id
    }

    fn side_mut(&mut self, side: BidType) -> &mut BTreeSet<QueueKey> {
        match side {
            BidType::Buy => &mut self.buys,
            BidType::Sell => &mut self.sells,
        }
    }

    pub fn side(&self, side: BidType) -> &BTreeSet<QueueKey> {
        match side {
            BidType::Buy => &self.buys,
            BidType::Sell => &self.sells,
        }
    }

    /// Queue a bid, replacing any previous entry for the same id
    pub fn insert(&mut self, bid: &Bid) {
        self.remove(bid.id);
        let key = QueueKey::for_bid(bid);
        self.side_mut(bid.bid_type).insert(key);
        self.index.insert(bid.id, (bid.bid_type, key));
    }

    pub fn remove(&mut self, bid_id: i64) -> bool {
        match self.index.remove(&bid_id) {
            Some((side, key)) => self.side_mut(side).remove(&key),
            None => false,
        }
    }

    pub fn contains(&self, bid_id: i64) -> bool {
        self.index.contains_key(&bid_id)
    }

    /// Queued ids of one side, best first
    pub fn ids(&self, side: BidType) -> Vec<i64> {
        self.side(side).iter().map(|k| k.bid_id).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BidStatus;
    use chrono::Duration;

    fn bid(id: i64, bid_type: BidType, price: i64, age_secs: i64) -> Bid {
        let created = Utc::now() - Duration::seconds(age_secs);
        Bid {
            id,
            user_id: id,
            product_option_id: 3,
            price,
            bid_type,
            status: BidStatus::Pending,
            created_at: created,
            updated_at: created,
            expires_at: created + Duration::days(7),
            cancelled_at: None,
            cancelled_by_admin: false,
            admin_reason: None,
            admin_comment: None,
        }
    }

    #[test]
    fn test_buy_queue_is_highest_price_then_oldest() {
        let mut book = OptionBook::new(3);
        book.insert(&bid(1, BidType::Buy, 100, 10));
        book.insert(&bid(2, BidType::Buy, 120, 5));
        book.insert(&bid(3, BidType::Buy, 120, 50));
        assert_eq!(book.ids(BidType::Buy), vec![3, 2, 1]);
    }

    #[test]
    fn test_sell_queue_is_lowest_price_then_oldest() {
        let mut book = OptionBook::new(3);
        book.insert(&bid(1, BidType::Sell, 100, 10));
        book.insert(&bid(2, BidType::Sell, 90, 5));
        book.insert(&bid(3, BidType::Sell, 100, 50));
        assert_eq!(book.ids(BidType::Sell), vec![2, 3, 1]);
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let mut book = OptionBook::new(3);
        let mut b = bid(1, BidType::Buy, 100, 10);
        book.insert(&b);
        b.price = 150;
        book.insert(&b);
        assert_eq!(book.len(), 1);
        assert!(book.remove(1));
        assert!(!book.remove(1));
        assert!(book.is_empty());
    }
}
