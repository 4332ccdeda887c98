use crate::shows::{cast_vote, health, show_tally, voter_picks, voter_voted_for_song};
use crate::sse::live_updates_sse;
use crate::startup::AppState;
use axum::{
    Router,
    extract::Extension,
    http::{
        Method, StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/votes", post(cast_vote))
        .route("/shows/:show_id/votes", get(show_tally))
        .route("/shows/:show_id/votes/:voter_id", get(voter_picks))
        .route(
            "/shows/:show_id/votes/:voter_id/:song_id",
            get(voter_voted_for_song),
        )
        .route("/live", get(live_updates_sse))
        .route("/health", get(health))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
