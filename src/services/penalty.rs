use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::models::Penalty;

/// Bidding cooldowns imposed after trade cancellations
#[derive(Clone)]
pub struct PenaltyRegistry {
    by_user: Arc<DashMap<i64, Vec<Penalty>>>,
    next_id: Arc<AtomicI64>,
    cooldown: Duration,
}

impl PenaltyRegistry {
    pub fn new(cooldown_days: i64) -> Self {
        Self {
            by_user: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            cooldown: Duration::days(cooldown_days.max(0)),
        }
    }

    pub fn apply(
        &self,
        user_id: i64,
        trade_id: Option<i64>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Penalty {
        let penalty = Penalty {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id,
            trade_id,
            reason: reason.into(),
            starts_at: now,
            expires_at: now + self.cooldown,
        };
        self.by_user
            .entry(user_id)
            .or_default()
            .push(penalty.clone());

        info!(
            user_id = user_id,
            trade_id = ?trade_id,
            expires_at = %penalty.expires_at,
            "Bidding penalty applied"
        );
        metrics::counter!("penalties_applied_total").increment(1);
        penalty
    }

    /// Latest expiry among the user's active penalties
    pub fn active_until(&self, user_id: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.by_user.get(&user_id).and_then(|penalties| {
            penalties
                .iter()
                .filter(|p| p.is_active(now))
                .map(|p| p.expires_at)
                .max()
        })
    }

    pub fn ensure_can_bid(&self, user_id: i64, now: DateTime<Utc>) -> Result<(), ApiError> {
        match self.active_until(user_id, now) {
            Some(until) => Err(ApiError::penalty_active(until)),
            None => Ok(()),
        }
    }

    pub fn history(&self, user_id: i64) -> Vec<Penalty> {
        self.by_user
            .get(&user_id)
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_penalty_blocks_until_expiry() {
        let registry = PenaltyRegistry::new(3);
        let now = Utc::now();
        let penalty = registry.apply(7, Some(1), "BUYER_CANCELLED", now);
        assert_eq!(penalty.expires_at - penalty.starts_at, Duration::days(3));

        let err = registry.ensure_can_bid(7, now + Duration::days(2)).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PenaltyActive);

        assert!(registry.ensure_can_bid(7, now + Duration::days(3)).is_ok());
        assert!(registry.ensure_can_bid(8, now).is_ok());
    }

    #[test]
    fn test_longest_active_penalty_wins() {
        let registry = PenaltyRegistry::new(3);
        let now = Utc::now();
        registry.apply(1, Some(1), "SELLER_CANCELLED", now - Duration::days(1));
        let later = registry.apply(1, Some(2), "SELLER_CANCELLED", now);
        assert_eq!(registry.active_until(1, now), Some(later.expires_at));
        assert_eq!(registry.history(1).len(), 2);
    }
}
