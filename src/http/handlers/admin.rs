// Admin endpoints: dictionary mutations, anti-scraping controls, bans,
// user log. Auth is the static ADMIN_TOKEN header or a staff session with
// the admin role; an empty ADMIN_TOKEN means dev mode and everything is
// open.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::AppError;
use crate::state::AppState;
use crate::ws::core::hub;

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if state.config.admin_token.is_empty() {
        return Ok(());
    }
    if let Some(token) = headers.get("x-admin-token").and_then(|v| v.to_str().ok()) {
        if token == state.config.admin_token {
            return Ok(());
        }
    }
    if let Some(token) = headers.get("x-staff-token").and_then(|v| v.to_str().ok()) {
        if let Some(account) = state.stores.resolve_staff_token(token).await {
            if account.role == "admin" {
                return Ok(());
            }
        }
    }
    tracing::warn!("rejected admin request");
    Err(AppError::Unauthorized("admin auth required".into()))
}

#[derive(Debug, Deserialize)]
pub struct WordBody {
    pub word: String,
}

fn validate_word(word: &str) -> Result<(), AppError> {
    let trimmed = word.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 45 {
        return Err(AppError::InvalidWord("invalid word length".into()));
    }
    if !trimmed.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'') {
        return Err(AppError::InvalidWord("invalid characters".into()));
    }
    Ok(())
}

/// Append a word to the dictionary file and rebuild the index. A failed
/// rebuild after a successful append still reports success, with a warning.
pub async fn add_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WordBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    validate_word(&body.word)?;

    crate::dictionary::append_word(&state.config.dict_path, &body.word).await?;
    tracing::info!("admin added word to dictionary");

    match state
        .dictionary
        .rebuild_from(&state.config.dict_path, state.config.sample_cap)
        .await
    {
        Ok(report) => Ok(Json(json!({
            "success": true,
            "linesProcessed": report.lines_processed,
        }))),
        Err(e) => {
            tracing::error!("index rebuild failed after add-word: {e}");
            Ok(Json(json!({
                "success": true,
                "warning": "rebuild_failed",
            })))
        }
    }
}

pub async fn remove_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WordBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;

    let removed = crate::dictionary::remove_word(&state.config.dict_path, &body.word).await?;
    if !removed {
        return Err(AppError::NotFound("word not in dictionary".into()));
    }
    tracing::info!("admin removed word from dictionary");

    match state
        .dictionary
        .rebuild_from(&state.config.dict_path, state.config.sample_cap)
        .await
    {
        Ok(report) => Ok(Json(json!({
            "success": true,
            "linesProcessed": report.lines_processed,
        }))),
        Err(e) => {
            tracing::error!("index rebuild failed after remove-word: {e}");
            Ok(Json(json!({
                "success": true,
                "warning": "rebuild_failed",
            })))
        }
    }
}

pub async fn antiscraping_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.guard.stats().await))
}

pub async fn blocked_ips(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(json!({ "blocked": state.guard.blocked_ips().await })))
}

#[derive(Debug, Deserialize)]
pub struct IpBody {
    pub ip: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn unblock_ip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IpBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    let removed = state.guard.unblock(&body.ip).await;
    Ok(Json(json!({ "unblocked": removed })))
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.stores.list_users().await))
}

pub async fn list_bans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.stores.list_bans().await))
}

/// Ban an IP: persist it, then evict every live socket from that IP with a
/// typed `banned` event. Their seats drain through the normal grace-window
/// eviction.
pub async fn ban_ip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IpBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&state, &headers).await?;
    let reason = body.reason.as_deref().unwrap_or("banned");
    state.stores.add_ban(&body.ip, reason).await?;
    let evicted = hub::evict_ip(&state, &body.ip, reason).await;
    tracing::info!("banned ip, evicted {} sockets", evicted.len());
    Ok((
        StatusCode::CREATED,
        Json(json!({ "banned": body.ip, "evictedSockets": evicted.len() })),
    ))
}

pub async fn unban_ip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ip): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    let removed = state.stores.remove_ban(&ip).await?;
    if !removed {
        return Err(AppError::NotFound("ip not banned".into()));
    }
    Ok(Json(json!({ "unbanned": ip })))
}
