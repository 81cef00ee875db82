use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_core::stream::Stream;
use opsdesk_core::sync::SyncBusStats;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::main_lib::AppState;

async fn force_refresh(State(state): State<Arc<AppState>>) -> StatusCode {
    state.sync_bus.force_refresh();
    StatusCode::NO_CONTENT
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<SyncBusStats> {
    Json(state.sync_bus.stats())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = BroadcastStream::new(state.sync_bus.subscribe_stream());
    let stream = tokio_stream::StreamExt::filter_map(receiver, |notification| match notification {
        Ok(notification) => match SseEvent::default()
            .event(notification.topic.clone())
            .json_data(&notification)
        {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                tracing::error!(
                    "Failed to serialize SSE payload for {}: {}",
                    notification.topic,
                    err
                );
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!("Event stream lagged, {} notifications missed", missed);
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/refresh", post(force_refresh))
        .route("/sync/stats", get(get_stats))
        .route("/events/stream", get(stream_events))
}
