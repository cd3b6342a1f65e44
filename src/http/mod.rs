pub mod handlers;
pub mod routes;

use crate::state::AppState;
use axum::Router;

/// All HTTP routes: public dictionary API plus token-gated admin surface.
pub fn create_http_routes(state: AppState) -> Router {
    Router::new()
        .merge(routes::api::routes(state.clone()))
        .merge(routes::admin::routes(state))
}
