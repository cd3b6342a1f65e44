use crate::state::AppState;
use crate::ws::handler::ws_handler;
use axum::{Router, routing::get};

/// Create WebSocket routes.
///
/// - GET `/ws` -> game socket upgrade (all game traffic flows over it)
pub fn create_ws_routes(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}
