//! Notifications Handler
//!
//! Pull (paged or cursor) reads, read receipts and the per-user SSE stream

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::Result;
use crate::handlers::extractors::ApiQuery;
use crate::handlers::queries::{NotificationQuery, PaginationParams};
use crate::handlers::response::Paged;
use crate::middleware::metrics::track_stream_connection;
use crate::models::notification::Notification;
use crate::services::notification_dispatcher::Subscription;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: usize,
}

/// List the caller's notifications
/// GET /v1/notification
///
/// Without `afterId` this is a newest-first page; with it, the oldest
/// notifications after that id are returned with a `nextCursor`.
#[utoipa::path(
    get,
    path = "/v1/notification",
    tag = "notifications",
    params(NotificationQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Newest-first page; with afterId the body is a NotificationCursorPage", body = Paged<Notification>)
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Response> {
    if query.after_id.is_some() {
        let page = state
            .notifications
            .list_after(user.0.sub, query.after_id, query.cursor_limit());
        return Ok(Json(page).into_response());
    }

    let params = PaginationParams {
        page: query.page,
        size: query.size,
    };
    let page: Paged<Notification> = state
        .notifications
        .list(user.0.sub, &params.to_pagination())
        .into();
    Ok(Json(page).into_response())
}

/// Mark a notification as read
/// PATCH /v1/notification/{id}/read
#[utoipa::path(
    patch,
    path = "/v1/notification/{id}/read",
    tag = "notifications",
    params(("id" = i64, Path, description = "Notification ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 403, description = "Not the recipient"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(notification_id): Path<i64>,
) -> Result<Json<Notification>> {
    let notification = state.notifications.mark_read(notification_id, user.0.sub)?;
    Ok(Json(notification))
}

/// GET /v1/notification/unread-count
#[utoipa::path(
    get,
    path = "/v1/notification/unread-count",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCountResponse)
    )
)]
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<UnreadCountResponse> {
    Json(UnreadCountResponse {
        unread_count: state.notifications.unread_count(user.0.sub),
    })
}

/// Keeps the stream gauge in step with open connections
struct StreamGauge;

impl StreamGauge {
    fn open() -> Self {
        track_stream_connection(true);
        StreamGauge
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        track_stream_connection(false);
    }
}

struct StreamState {
    subscription: Subscription,
    dispatcher: crate::services::NotificationDispatcher,
    connected: bool,
    _gauge: StreamGauge,
}

fn notification_events(
    state: StreamState,
) -> impl Stream<Item = std::result::Result<Event, axum::Error>> {
    stream::unfold(state, |mut state| async move {
        if !state.connected {
            state.connected = true;
            let hello = Event::default()
                .event("connect")
                .data(format!("connected user {}", state.subscription.user_id()));
            return Some((Ok(hello), state));
        }

        let notification = state.subscription.recv().await?;
        state
            .dispatcher
            .mark_delivered(notification.user_id, notification.id);
        let event = Event::default()
            .event("notification")
            .id(notification.id.to_string())
            .json_data(&notification);
        Some((event, state))
    })
}

/// Subscribe to the caller's notifications
/// GET /v1/notification/subscribe
///
/// Nothing is replayed on connect; clients de-duplicate by event id.
#[utoipa::path(
    get,
    path = "/v1/notification/subscribe",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Server-sent events: `connect`, then `notification` events", content_type = "text/event-stream")
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let keepalive = Duration::from_secs(state.config.notification.sse_keepalive_secs.max(1));
    let stream_state = StreamState {
        subscription: state.notifications.subscribe(user.0.sub),
        dispatcher: state.notifications.clone(),
        connected: false,
        _gauge: StreamGauge::open(),
    };

    Sse::new(notification_events(stream_state))
        .keep_alive(KeepAlive::new().interval(keepalive).text("keep-alive"))
}
