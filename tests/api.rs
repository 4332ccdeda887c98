use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use futures::StreamExt;
use serde_json::{Value, json};
use setlist_voting::{
    AppState, app,
    clock::{Clock, ManualClock, SystemClock},
    live::{BroadcastChangeFeed, ChangeNotification, ConnectedPolicy},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_app(min_interval: chrono::Duration, clock: Arc<dyn Clock>) -> (Router, BroadcastChangeFeed) {
    let feed = BroadcastChangeFeed::new(32);
    let state = AppState::in_memory(
        feed.clone(),
        clock,
        min_interval,
        ConnectedPolicy::LastObserved,
    );
    (app(state), feed)
}

fn vote_request(body: Value) -> Request<Body> {
    Request::post("/votes")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_until(
    stream: &mut (impl futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin),
    seen: &mut String,
    needle: &str,
) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !seen.contains(needle) {
            let chunk = stream.next().await.expect("stream ended").unwrap();
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never saw {needle:?} in {seen:?}"));
}

fn vote() -> Value {
    json!({"voter_id": "u1", "song_id": "s1", "setlist_id": "sl1", "show_id": "sh1"})
}

#[tokio::test]
async fn first_vote_succeeds_and_repeat_is_duplicate() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let first = app.clone().oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(json_body(first).await, json!({"status": "success"}));

    let second = app.oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(json_body(second).await, json!({"status": "duplicate"}));
}

#[tokio::test]
async fn empty_identifier_is_rejected() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .oneshot(vote_request(
            json!({"voter_id": "u1", "song_id": "", "setlist_id": "sl1", "show_id": "sh1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["details"], "Invalid request: missing song_id");
}

#[tokio::test]
async fn rapid_votes_from_one_voter_are_throttled() {
    let clock = ManualClock::new(chrono::Utc::now());
    let (app, _feed) = test_app(chrono::Duration::seconds(1), Arc::new(clock.clone()));

    let first = app.clone().oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let other_song =
        json!({"voter_id": "u1", "song_id": "s2", "setlist_id": "sl1", "show_id": "sh1"});
    let throttled = app.clone().oneshot(vote_request(other_song.clone())).await.unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance(chrono::Duration::seconds(1));
    let later = app.oneshot(vote_request(other_song)).await.unwrap();
    assert_eq!(later.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn repeat_inside_default_interval_is_still_a_duplicate() {
    let clock = ManualClock::new(chrono::Utc::now());
    let (app, _feed) = test_app(chrono::Duration::milliseconds(1000), Arc::new(clock));

    let first = app.clone().oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(json_body(second).await, json!({"status": "duplicate"}));
}

#[tokio::test]
async fn refused_votes_do_not_extend_the_interval() {
    let clock = ManualClock::new(chrono::Utc::now());
    let (app, _feed) = test_app(chrono::Duration::milliseconds(1000), Arc::new(clock.clone()));

    app.clone().oneshot(vote_request(vote())).await.unwrap();

    clock.advance(chrono::Duration::milliseconds(600));
    let other_song =
        json!({"voter_id": "u1", "song_id": "s2", "setlist_id": "sl1", "show_id": "sh1"});
    let throttled = app.clone().oneshot(vote_request(other_song.clone())).await.unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json_body(throttled).await["details"],
        "Too many votes, retry in 400ms"
    );

    clock.advance(chrono::Duration::milliseconds(400));
    let later = app.oneshot(vote_request(other_song)).await.unwrap();
    assert_eq!(later.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn voted_lookup_reflects_recorded_votes() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));
    let lookup = || {
        Request::get("/shows/sh1/votes/u1/s1")
            .body(Body::empty())
            .unwrap()
    };

    let before = app.clone().oneshot(lookup()).await.unwrap();
    assert_eq!(before.status(), StatusCode::OK);
    assert_eq!(json_body(before).await, json!({"voted": false}));

    app.clone().oneshot(vote_request(vote())).await.unwrap();

    let after = app.oneshot(lookup()).await.unwrap();
    assert_eq!(json_body(after).await, json!({"voted": true}));
}

#[tokio::test]
async fn tallies_need_a_database() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .oneshot(Request::get("/shows/sh1/votes").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_in_memory_store() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .oneshot(Request::get("/artists").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_stream_reports_connection_and_votes() {
    let (app, _feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .clone()
        .oneshot(
            Request::get("/live?collections=votes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");

    let mut stream = response.into_body().into_data_stream();
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, r#""connected":true"#).await;

    let cast = app.oneshot(vote_request(vote())).await.unwrap();
    assert_eq!(cast.status(), StatusCode::CREATED);

    read_until(&mut stream, &mut seen, "event: update").await;
    read_until(&mut stream, &mut seen, r#""kind":"vote_change""#).await;
    assert!(seen.contains(r#""show_id":"sh1""#));
}

#[tokio::test]
async fn live_stream_only_carries_watched_collections() {
    let (app, feed) = test_app(chrono::Duration::zero(), Arc::new(SystemClock));

    let response = app
        .oneshot(
            Request::get("/live?collections=comments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut stream = response.into_body().into_data_stream();
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, r#""connected":true"#).await;

    feed.publish(ChangeNotification::new("votes", Some("sh1"), json!({"n": 1})));
    feed.publish(ChangeNotification::new("comments", Some("sh2"), json!({"n": 2})));

    read_until(&mut stream, &mut seen, r#""kind":"comment_change""#).await;
    assert!(!seen.contains("vote_change"));
    assert!(seen.contains(r#""show_id":"sh2""#));
}
