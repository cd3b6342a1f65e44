use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub type KeyedRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Endpoint-coarse rate limiting keyed by `(IP, path)`. The quota comes from
/// `RATE_LIMIT_MAX` per 60s window.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    use std::sync::OnceLock;
    static LIMITER: OnceLock<KeyedRateLimiter> = OnceLock::new();

    let limiter = LIMITER.get_or_init(|| {
        let per_minute =
            NonZeroU32::new(state.config.rate_limit_max.max(1)).unwrap_or(NonZeroU32::MIN);
        Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
    });

    let key = format!("{}:{}", client_ip(&request), request.uri().path());
    match limiter.check_key(&key) {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("endpoint rate limit exceeded for {key}");
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}

/// Anti-scraping layer for the public API: ban check, per-IP history,
/// suspicion scoring. Fail-open: guard internals never reject on their own
/// errors, only on policy.
pub async fn antiscraping_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);
    if state.stores.is_banned(&ip).await {
        return Err(crate::errors::AppError::Forbidden.into_response());
    }

    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let api_token = request
        .headers()
        .get("x-api-token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let now = chrono::Utc::now().timestamp_millis();
    match state
        .guard
        .check_request(&ip, &path, &user_agent, api_token.as_deref(), now)
        .await
    {
        Ok(()) => Ok(next.run(request).await),
        Err(e) => Err(e.into_response()),
    }
}

/// CORS configuration from `CORS_ORIGIN`. A `*` entry switches to the open
/// policy without credentials.
pub fn cors_layer(state: &AppState) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::PUT,
        axum::http::Method::DELETE,
        axum::http::Method::OPTIONS,
    ];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::HeaderName::from_static("x-admin-token"),
        header::HeaderName::from_static("x-staff-token"),
        header::HeaderName::from_static("x-api-token"),
    ];

    if state.config.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    tracing::info!("CORS allowed origins: {:?}", origins);

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
