use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

/// Settlement service configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub fee_rate: Decimal,        // Platform fee (0.10 = 10%)
    pub hold_period: Duration,    // Time a settlement stays PENDING before payout
    pub process_interval: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(10, 2),
            hold_period: Duration::ZERO,
            process_interval: Duration::from_secs(5),
        }
    }
}

impl SettlementConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SETTLEMENT_FEE_RATE") {
            match Decimal::from_str(&val) {
                Ok(rate) if rate >= Decimal::ZERO && rate <= Decimal::ONE => {
                    config.fee_rate = rate;
                    tracing::info!("Using custom settlement fee rate: {}", rate);
                }
                _ => tracing::warn!("Ignoring invalid SETTLEMENT_FEE_RATE: {}", val),
            }
        }

        if let Ok(val) = std::env::var("SETTLEMENT_HOLD_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.hold_period = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("SETTLEMENT_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.process_interval = Duration::from_secs(secs.max(1));
            }
        }

        config
    }
}

/// Fee and payout for a total amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementSplit {
    pub total_amount: i64,
    pub fee_amount: i64,
    pub settlement_amount: i64,
}

/// Fee is `total * fee_rate` rounded half away from zero to whole currency units;
/// the seller receives the remainder so the parts always add back up to `total`.
pub fn compute_split(total_amount: i64, fee_rate: Decimal) -> SettlementSplit {
    let fee = (Decimal::from(total_amount) * fee_rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
        .clamp(0, total_amount.max(0));

    SettlementSplit {
        total_amount,
        fee_amount: fee,
        settlement_amount: total_amount - fee,
    }
}
