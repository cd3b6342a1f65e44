// Staff account CRUD and login. Accounts live in the `staff` JSON store;
// session tokens are process-local.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::AppError;
use crate::http::handlers::admin::require_admin;
use crate::state::AppState;
use crate::store::{StaffAccount, hash_password};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<Value>, AppError> {
    let account = state
        .stores
        .verify_staff(&body.username, &body.password)
        .await
        .ok_or_else(|| AppError::Unauthorized("bad credentials".into()))?;
    let token = state.stores.issue_staff_token(&account.username).await;
    tracing::info!("staff login: {}", account.username);
    Ok(Json(json!({ "token": token, "role": account.role })))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(json!({ "staff": state.stores.list_staff().await })))
}

#[derive(Debug, Deserialize)]
pub struct UpsertBody {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpsertBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    if body.username.trim().is_empty() || body.password.len() < 8 {
        return Err(AppError::BadRequest(
            "username required, password of 8+ chars".into(),
        ));
    }
    let account = StaffAccount {
        username: body.username.trim().to_string(),
        password_hash: hash_password(&body.password),
        role: body.role.unwrap_or_else(|| "moderator".into()),
    };
    state.stores.upsert_staff(&account).await?;
    Ok(Json(json!({ "created": account.username, "role": account.role })))
}

pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers).await?;
    if username == "admin" {
        return Err(AppError::BadRequest("cannot delete the admin account".into()));
    }
    let removed = state.stores.delete_staff(&username).await?;
    if !removed {
        return Err(AppError::NotFound("no such staff account".into()));
    }
    Ok(Json(json!({ "deleted": username })))
}
