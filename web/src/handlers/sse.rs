//! Server-sent events subscription.
//!
//! Emits `connected` on subscribe, then forwards the user's realtime
//! notifications (`coupon-issued`, `order-completed`,
//! `payment-completed`). Lagged subscribers skip dropped notifications
//! rather than disconnect.

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use storefront_core::ids::UserId;
use storefront_core::notify::Notification;
use tokio::sync::broadcast::error::RecvError;

fn to_sse_event(notification: &Notification) -> Option<Event> {
    match Event::default()
        .event(notification.event_name())
        .json_data(notification)
    {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode SSE event");
            None
        }
    }
}

/// `GET /api/sse/subscribe/{userId}`.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = UserId::new(user_id);
    let mut receiver = state.api.subscribe(user_id).await;
    tracing::info!(user_id = %user_id, "SSE subscriber connected");

    let stream = async_stream::stream! {
        if let Some(event) = to_sse_event(&Notification::Connected { user_id }) {
            yield Ok(event);
        }
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    if let Some(event) = to_sse_event(&notification) {
                        yield Ok(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped, "SSE subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
