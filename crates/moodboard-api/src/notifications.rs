use std::convert::Infallible;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use tracing::{debug, warn};

use moodboard_auth::Principal;
use moodboard_core::Error;
use moodboard_types::api::NotificationView;
use moodboard_types::events::StreamEvent;

use crate::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct UnreadQuery {
    pub limit: Option<usize>,
}

pub async fn list_unread(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UnreadQuery>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    Ok(Json(state.board.list_unread(&principal.id, query.limit).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(notification_id): Path<String>,
) -> ApiResult<StatusCode> {
    let notification = state.board.get_notification(&notification_id).await?;
    if notification.receiver_id != principal.id {
        return Err(Error::Forbidden("notification belongs to another user".into()).into());
    }
    state.board.mark_read(&notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn sse_event(event: &StreamEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(ev) => ev,
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.name(), e);
            Event::default().comment("encode error")
        }
    }
}

/// Server-sent events carrying the caller's unread notifications. The
/// watcher lives as long as the stream, so a client disconnect stops it.
pub async fn stream(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut watcher = state
        .board
        .watch_notifications(&principal.id, state.notification_poll);
    debug!("Notification stream opened for {}", principal.id);

    let stream = async_stream::stream! {
        yield Ok(sse_event(&StreamEvent::Ready { user_id: principal.id.clone() }));
        while let Some(notifications) = watcher.changed().await {
            yield Ok(sse_event(&StreamEvent::Unread { notifications }));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
