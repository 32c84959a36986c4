use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// Authentication happens during the HTTP upgrade handshake: the handler
/// checks the configured token against a `token` query parameter or a
/// bearer header, and a rejected client receives a protocol-level error
/// message over the upgraded socket before it is closed. Upgrade responses
/// cannot carry a body, so rejecting at the HTTP layer would leave the
/// client without a reason.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/voice", get(ws::ws_speech_handler))
        .layer(TraceLayer::new_for_http())
}
