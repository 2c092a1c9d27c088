//! Notification Dispatcher Service
//!
//! Appends notifications to the per-user log and broadcasts them to live
//! server-sent event streams. Ids are allocated and broadcast while the user's
//! log entry is locked, so a user's log and live stream are always in id order.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::database::repository::{PagedResult, Pagination};
use crate::error::ApiError;
use crate::models::notification::{NewNotification, Notification, NotificationCursorPage};

/// Message sent via broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotification {
    pub user_id: i64,
    pub notification: Notification,
}

/// Notification dispatcher configuration
#[derive(Debug, Clone)]
pub struct NotificationDispatcherConfig {
    /// Channel capacity for broadcast
    pub channel_capacity: usize,
    /// Only notifications younger than this are redelivered
    pub redelivery_window: Duration,
}

impl Default for NotificationDispatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            redelivery_window: Duration::from_secs(600),
        }
    }
}

/// Notification dispatcher service
#[derive(Clone)]
pub struct NotificationDispatcher {
    log: Arc<DashMap<i64, Vec<Notification>>>,
    owners: Arc<DashMap<i64, i64>>,
    next_id: Arc<AtomicI64>,
    live: Arc<DashMap<i64, usize>>,
    broadcast_tx: broadcast::Sender<BroadcastNotification>,
    config: NotificationDispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationDispatcherConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            log: Arc::new(DashMap::new()),
            owners: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            live: Arc::new(DashMap::new()),
            broadcast_tx: tx,
            config,
        }
    }

    /// Record a notification and push it to any live stream of the user
    pub fn send(&self, request: NewNotification) -> Notification {
        let notification = {
            let mut entry = self.log.entry(request.user_id).or_default();
            let notification = Notification {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                user_id: request.user_id,
                kind: request.kind,
                trade_id: request.trade_id,
                title: request.title,
                message: request.message,
                created_at: Utc::now(),
                read_at: None,
                delivered_at: None,
            };
            entry.push(notification.clone());
            // broadcast before releasing the entry so concurrent sends stay in id order
            self.broadcast(&notification);
            notification
        };
        self.owners.insert(notification.id, notification.user_id);

        debug!(
            notification_id = notification.id,
            user_id = notification.user_id,
            kind = %notification.kind,
            "Notification recorded"
        );
        metrics::counter!("notifications_sent_total", "kind" => notification.kind.to_string())
            .increment(1);

        notification
    }

    pub fn send_all(&self, requests: Vec<NewNotification>) -> Vec<Notification> {
        requests.into_iter().map(|r| self.send(r)).collect()
    }

    fn broadcast(&self, notification: &Notification) {
        if !self.is_live(notification.user_id) {
            return;
        }
        // Err only means no receiver is currently attached
        let _ = self.broadcast_tx.send(BroadcastNotification {
            user_id: notification.user_id,
            notification: notification.clone(),
        });
    }

    /// Open a live subscription for one user
    pub fn subscribe(&self, user_id: i64) -> Subscription {
        let receiver = self.broadcast_tx.subscribe();
        *self.live.entry(user_id).or_insert(0) += 1;
        info!(user_id = user_id, "Notification stream connected");

        Subscription {
            user_id,
            receiver,
            _guard: LiveGuard {
                user_id,
                live: self.live.clone(),
            },
        }
    }

    pub fn is_live(&self, user_id: i64) -> bool {
        self.live.get(&user_id).map(|c| *c > 0).unwrap_or(false)
    }

    pub fn mark_delivered(&self, user_id: i64, notification_id: i64) {
        if let Some(mut entries) = self.log.get_mut(&user_id) {
            if let Ok(idx) = entries.binary_search_by_key(&notification_id, |n| n.id) {
                if entries[idx].delivered_at.is_none() {
                    entries[idx].delivered_at = Some(Utc::now());
                }
            }
        }
    }

    /// Newest first
    pub fn list(&self, user_id: i64, pagination: &Pagination) -> PagedResult<Notification> {
        let rows: Vec<Notification> = self
            .log
            .get(&user_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default();
        pagination.apply(rows)
    }

    /// Oldest first, strictly after `after_id`
    pub fn list_after(
        &self,
        user_id: i64,
        after_id: Option<i64>,
        limit: usize,
    ) -> NotificationCursorPage {
        let after = after_id.unwrap_or(0);
        let limit = limit.clamp(1, 100);

        let mut rows: Vec<Notification> = self
            .log
            .get(&user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|n| n.id > after)
                    .take(limit + 1)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let has_next = rows.len() > limit;
        rows.truncate(limit);

        NotificationCursorPage {
            next_cursor: rows.last().map(|n| n.id),
            items: rows,
            has_next,
        }
    }

    pub fn mark_read(&self, notification_id: i64, user_id: i64) -> Result<Notification, ApiError> {
        let owner = self
            .owners
            .get(&notification_id)
            .map(|o| *o)
            .ok_or_else(|| ApiError::not_found("Notification"))?;
        if owner != user_id {
            return Err(ApiError::not_owner("notification"));
        }

        let mut entries = self
            .log
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::not_found("Notification"))?;
        let idx = entries
            .binary_search_by_key(&notification_id, |n| n.id)
            .map_err(|_| ApiError::not_found("Notification"))?;

        let entry = &mut entries[idx];
        if entry.read_at.is_none() {
            entry.read_at = Some(Utc::now());
        }
        Ok(entry.clone())
    }

    pub fn unread_count(&self, user_id: i64) -> usize {
        self.log
            .get(&user_id)
            .map(|entries| entries.iter().filter(|n| n.read_at.is_none()).count())
            .unwrap_or(0)
    }

    /// Re-broadcast recent undelivered notifications of users with a live stream
    pub fn redeliver_pending(&self, now: DateTime<Utc>) -> usize {
        let window = ChronoDuration::from_std(self.config.redelivery_window)
            .unwrap_or_else(|_| ChronoDuration::minutes(10));
        let cutoff = now - window;

        let live_users: Vec<i64> = self
            .live
            .iter()
            .filter(|e| *e.value() > 0)
            .map(|e| *e.key())
            .collect();

        let mut pending = Vec::new();
        for user_id in live_users {
            if let Some(entries) = self.log.get(&user_id) {
                pending.extend(
                    entries
                        .iter()
                        .filter(|n| n.delivered_at.is_none() && n.created_at >= cutoff)
                        .cloned(),
                );
            }
        }

        for notification in &pending {
            self.broadcast(notification);
        }
        if !pending.is_empty() {
            debug!(count = pending.len(), "Redelivered pending notifications");
        }
        pending.len()
    }
}

/// Decrements the live-stream count when a subscription ends
struct LiveGuard {
    user_id: i64,
    live: Arc<DashMap<i64, usize>>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut remove = false;
        if let Some(mut count) = self.live.get_mut(&self.user_id) {
            *count = count.saturating_sub(1);
            remove = *count == 0;
        }
        if remove {
            self.live.remove_if(&self.user_id, |_, c| *c == 0);
        }
        info!(user_id = self.user_id, "Notification stream disconnected");
    }
}

/// Broadcast receiver filtered to one user
pub struct Subscription {
    user_id: i64,
    receiver: broadcast::Receiver<BroadcastNotification>,
    _guard: LiveGuard,
}

impl Subscription {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Next notification for this user; `None` once the dispatcher is gone
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if msg.user_id == self.user_id => return Some(msg.notification),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        user_id = self.user_id,
                        skipped = skipped,
                        "Notification stream lagged; relying on redelivery"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
