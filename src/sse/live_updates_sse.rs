use crate::live::{LiveUpdateSubscriber, UpdateCallback};
use crate::sse::models::{LiveParams, status_event, update_event};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Query},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::debug;

enum Wake {
    Updates,
    Status,
    Closed,
}

/// Streams live changes for the requested collections.
///
/// Each connection owns one subscriber; it lives inside the stream, so a
/// client disconnect drops it and releases every channel it opened.
pub async fn live_updates_sse(
    Extension(app_state): Extension<AppState>,
    Query(params): Query<LiveParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let collections = params.collection_set();
    let subscriber = LiveUpdateSubscriber::new(
        app_state.feed.clone(),
        app_state.clock.clone(),
        app_state.policy,
    );

    let pending = Arc::new(Notify::new());
    let on_update: UpdateCallback = {
        let pending = pending.clone();
        Arc::new(move || pending.notify_one())
    };

    let mut connected = subscriber.connected_changes();
    debug!(?collections, "live stream opened");
    subscriber.start(collections, Some(on_update)).await;

    let stream = async_stream::stream! {
        let subscriber = subscriber;
        let initial = *connected.borrow_and_update();
        yield Ok(status_event(initial));

        loop {
            let wake = tokio::select! {
                _ = pending.notified() => Wake::Updates,
                changed = connected.changed() => {
                    if changed.is_ok() { Wake::Status } else { Wake::Closed }
                }
            };

            match wake {
                Wake::Updates => {
                    for update in subscriber.take_updates() {
                        yield Ok(update_event(&update));
                    }
                }
                Wake::Status => {
                    let now = *connected.borrow_and_update();
                    yield Ok(status_event(now));
                }
                Wake::Closed => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
