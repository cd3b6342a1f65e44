//! Token-gated admin surface: dictionary mutations, anti-scraping controls,
//! bans, user log and staff CRUD.

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::{
    http::handlers::{admin, staff},
    state::AppState,
};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/add-word", post(admin::add_word))
        .route("/admin/remove-word", post(admin::remove_word))
        .route("/admin/antiscraping/stats", get(admin::antiscraping_stats))
        .route("/admin/antiscraping/blocked-ips", get(admin::blocked_ips))
        .route("/admin/antiscraping/unblock", post(admin::unblock_ip))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/ban", get(admin::list_bans).post(admin::ban_ip))
        .route("/admin/ban/{ip}", delete(admin::unban_ip))
        .route("/staff/login", post(staff::login))
        .route("/staff", get(staff::list).post(staff::create))
        .route("/staff/{username}", delete(staff::delete))
        .with_state(state)
}
