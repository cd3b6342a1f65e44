//! Public dictionary API.
//!
//! Two protection layers, outermost first:
//! - endpoint-coarse rate limiting keyed by (IP, path)
//! - the anti-scraping guard (history, suspicion, block set)
//!
//! The honeypot paths sit outside the guard layer so a blocked scraper still
//! reaches them and keeps feeding its own score.

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::{
    http::handlers::dictionary::{
        api_token, dictionary_download, honeypot_wordlist, search, syllable_stats, top_syllables,
        validate, words_by_syllable,
    },
    middleware::{antiscraping_middleware, rate_limit_middleware},
    state::AppState,
};

pub fn routes(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/syllable-stats", get(syllable_stats))
        .route("/words-by-syllable", get(words_by_syllable))
        .route("/validate", get(validate))
        .route("/top-syllables", get(top_syllables))
        .route("/search", get(search))
        .route("/api-token", get(api_token))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            antiscraping_middleware,
        ));

    Router::new()
        .merge(guarded)
        .route("/dictionary.txt", get(dictionary_download))
        .route("/wordlist.json", get(honeypot_wordlist))
        .route("/api/internal/export", get(honeypot_wordlist))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}
