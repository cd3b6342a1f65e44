// Public dictionary query endpoints and the honeypot surface.

use axum::{
    Json,
    extract::{ConnectInfo, Query, State},
    http::StatusCode,
};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::dictionary::DictionaryIndex;
use crate::guard::SuspicionReason;
use crate::state::AppState;

/// Plausible-looking but synthetic honeypot payload.
static HONEYPOT_WORDS: Lazy<Value> = Lazy::new(|| {
    json!({
        "words": ["BRAVITUDE", "SOLANTIER", "MIRONDELLE", "CLAPOTEUSE", "VERMILLARD",
                   "TANGORINE", "PLOMBERESSE", "GRISOLER", "FOUINASSE", "CARAMBOISE"],
        "total": 412_087,
        "version": "2.3.1",
    })
});

#[derive(Debug, Deserialize)]
pub struct LengthQuery {
    pub length: usize,
}

#[derive(Debug, Deserialize)]
pub struct SyllableQuery {
    pub syl: String,
    pub length: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct WordQuery {
    pub word: String,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub length: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

/// All public queries 503 with `{ready:false}` while the index builds.
fn ready_index(state: &AppState) -> Result<Arc<DictionaryIndex>, (StatusCode, Json<Value>)> {
    state
        .dictionary
        .get()
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, Json(json!({"ready": false}))))
}

pub async fn syllable_stats(
    State(state): State<AppState>,
    Query(query): Query<LengthQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let index = ready_index(&state)?;
    let stats = index.stats_for(query.length).ok_or((
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "length must be 2, 3 or 4"})),
    ))?;
    Ok(Json(json!({ "length": query.length, "stats": stats })))
}

pub async fn words_by_syllable(
    State(state): State<AppState>,
    Query(query): Query<SyllableQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let index = ready_index(&state)?;
    let length = query.length.unwrap_or_else(|| query.syl.chars().count());
    let limit = query.limit.unwrap_or(state.config.sample_cap).min(100);
    let words = index.samples_for(length, &query.syl, limit);
    Ok(Json(json!({
        "syllable": query.syl.to_uppercase(),
        "count": index.count_for(&query.syl),
        "words": words,
    })))
}

pub async fn validate(
    State(state): State<AppState>,
    Query(query): Query<WordQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let index = ready_index(&state)?;
    Ok(Json(json!({ "exists": index.contains(&query.word) })))
}

pub async fn top_syllables(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let index = ready_index(&state)?;
    let limit = query.limit.unwrap_or(20).min(200);
    let top: Vec<Value> = index
        .top_syllables(query.length, limit)
        .into_iter()
        .map(|(syllable, count)| json!({ "syllable": syllable, "count": count }))
        .collect();
    Ok(Json(json!({ "length": query.length, "top": top })))
}

/// Search: fast path through the syllable samples when the query is itself
/// an indexable syllable, then the bounded scan as fallback.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let index = ready_index(&state)?;
    let limit = query.limit.unwrap_or(20).min(100);
    let needle = query.q.trim().to_uppercase();
    if needle.is_empty() {
        return Ok(Json(json!({ "results": [] })));
    }

    let len = needle.chars().count();
    let mut results = if (2..=4).contains(&len) && needle.chars().all(|c| c.is_alphabetic()) {
        index.samples_for(len, &needle, limit)
    } else {
        Vec::new()
    };
    if results.len() < limit {
        for word in index.scan_containing(&needle, limit) {
            if !results.contains(&word) {
                results.push(word);
                if results.len() >= limit {
                    break;
                }
            }
        }
    }
    Ok(Json(json!({ "query": needle, "results": results })))
}

/// Issue an IP-bound API token for subsequent public queries.
pub async fn api_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<Value> {
    let ip = addr.ip().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    let token = state.guard.generate_token(&ip, now).await;
    Json(json!({ "token": token, "ttlSeconds": 300 }))
}

/// Honeypot: hitting it at all marks the caller as a bot; the payload looks
/// real and is entirely synthetic.
pub async fn honeypot_wordlist(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<Value> {
    let ip = addr.ip().to_string();
    state.guard.note(&ip, SuspicionReason::Honeypot).await;
    tracing::warn!("honeypot hit from {ip}");
    Json(HONEYPOT_WORDS.clone())
}

/// The dictionary file is never downloadable; attempts are tagged.
pub async fn dictionary_download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> (StatusCode, Json<Value>) {
    let ip = addr.ip().to_string();
    state
        .guard
        .note(&ip, SuspicionReason::DictionaryAccess)
        .await;
    tracing::warn!("dictionary download attempt from {ip}");
    (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})))
}
