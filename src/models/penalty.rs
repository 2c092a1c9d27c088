use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bidding cooldown imposed on a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Penalty {
    pub id: i64,
    pub user_id: i64,
    pub trade_id: Option<i64>,
    pub reason: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Penalty {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.expires_at
    }
}
