use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::frame::RawFrame;
use crate::queue::IntakeQueue;

/// HTTP intake: `POST /v1/logs` takes one JSON record document per request.
pub fn router(queue: IntakeQueue) -> Router {
    Router::new()
        .route("/v1/logs", post(submit_log))
        .route("/healthz", get(|| async { "ok" }))
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(queue)
}

async fn submit_log(State(queue): State<IntakeQueue>, body: Bytes) -> StatusCode {
    if body.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    if queue.enqueue(RawFrame::document(body)) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
