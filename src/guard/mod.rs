// Anti-scraping guard: per-IP request tracking, rate limits, suspicion
// scoring, API token issuance, honeypot tagging and the automatic block set.
//
// Policy is fail-closed (a blocked IP is always rejected) while internals are
// fail-open: scoring never panics the caller and unknown state defaults to
// letting legitimate traffic through.

use crate::errors::AppError;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Sliding-window limits over the per-IP request history.
pub const PER_MINUTE_MAX: usize = 30;
pub const PER_HOUR_MAX: usize = 300;
/// Score at which an IP joins the block set.
pub const BLOCK_THRESHOLD: i32 = 100;
/// Score below which a swept IP leaves the block set again.
pub const UNBLOCK_THRESHOLD: i32 = BLOCK_THRESHOLD / 2;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const TOKEN_TTL_MS: i64 = 5 * MINUTE_MS;
const FORGET_IDLE_MS: i64 = 24 * HOUR_MS;

/// Minimum samples before the sequential-timing detector may fire.
const SEQUENTIAL_MIN_SAMPLES: usize = 10;
const SEQUENTIAL_WINDOW: usize = 20;
const SEQUENTIAL_MEAN_MS: f64 = 2000.0;
const SEQUENTIAL_STDDEV_MS: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionReason {
    TokenIpMismatch,
    MissingToken,
    InvalidToken,
    PerMinuteOverflow,
    PerHourOverflow,
    SuspiciousUserAgent,
    SequentialTiming,
    DictionaryAccess,
    Honeypot,
}

impl SuspicionReason {
    pub fn weight(self) -> i32 {
        match self {
            SuspicionReason::TokenIpMismatch => 50,
            SuspicionReason::MissingToken => 5,
            SuspicionReason::InvalidToken => 15,
            SuspicionReason::PerMinuteOverflow => 20,
            SuspicionReason::PerHourOverflow => 30,
            SuspicionReason::SuspiciousUserAgent => 10,
            SuspicionReason::SequentialTiming => 25,
            SuspicionReason::DictionaryAccess => 50,
            SuspicionReason::Honeypot => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SuspicionReason::TokenIpMismatch => "token_ip_mismatch",
            SuspicionReason::MissingToken => "missing_token",
            SuspicionReason::InvalidToken => "invalid_token",
            SuspicionReason::PerMinuteOverflow => "per_minute_overflow",
            SuspicionReason::PerHourOverflow => "per_hour_overflow",
            SuspicionReason::SuspiciousUserAgent => "suspicious_user_agent",
            SuspicionReason::SequentialTiming => "sequential_timing",
            SuspicionReason::DictionaryAccess => "dictionary_access",
            SuspicionReason::Honeypot => "honeypot",
        }
    }
}

#[derive(Debug, Clone)]
struct RequestEntry {
    at_ms: i64,
    path: String,
    user_agent: String,
}

#[derive(Debug, Default)]
struct ClientTrack {
    requests: Vec<RequestEntry>,
    tokens: HashSet<String>,
    suspicion: i32,
    last_seen_ms: i64,
}

#[derive(Debug, Clone)]
struct ApiToken {
    ip: String,
    issued_at_ms: i64,
    uses: u32,
}

pub struct ScrapeGuard {
    clients: Mutex<HashMap<String, ClientTrack>>,
    blocked: Mutex<HashSet<String>>,
    tokens: Mutex<HashMap<String, ApiToken>>,
}

impl ScrapeGuard {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            blocked: Mutex::new(HashSet::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate one API request. Records it in the IP's history, applies
    /// token and pattern scoring, then enforces the window limits and the
    /// block threshold.
    pub async fn check_request(
        &self,
        ip: &str,
        path: &str,
        user_agent: &str,
        api_token: Option<&str>,
        now_ms: i64,
    ) -> Result<(), AppError> {
        if self.is_blocked(ip).await {
            return Err(AppError::Forbidden);
        }

        let mut reasons: Vec<SuspicionReason> = Vec::new();

        // Token scoring is advisory: it raises suspicion, never rejects on
        // its own.
        match api_token {
            None => reasons.push(SuspicionReason::MissingToken),
            Some(token) => {
                let mut tokens = self.tokens.lock().await;
                match tokens.get_mut(token) {
                    None => reasons.push(SuspicionReason::InvalidToken),
                    Some(entry) if now_ms - entry.issued_at_ms > TOKEN_TTL_MS => {
                        tokens.remove(token);
                        reasons.push(SuspicionReason::InvalidToken);
                    }
                    Some(entry) if entry.ip != ip => {
                        tokens.remove(token);
                        reasons.push(SuspicionReason::TokenIpMismatch);
                    }
                    Some(entry) => entry.uses += 1,
                }
            }
        }

        if is_suspicious_user_agent(user_agent) {
            reasons.push(SuspicionReason::SuspiciousUserAgent);
        }

        let (minute_count, hour_count, sequential) = {
            let mut clients = self.clients.lock().await;
            let track = clients.entry(ip.to_string()).or_default();
            track.requests.retain(|r| now_ms - r.at_ms <= HOUR_MS);
            track.requests.push(RequestEntry {
                at_ms: now_ms,
                path: path.to_string(),
                user_agent: user_agent.to_string(),
            });
            track.last_seen_ms = now_ms;

            let minute = track
                .requests
                .iter()
                .filter(|r| now_ms - r.at_ms <= MINUTE_MS)
                .count();
            let hour = track.requests.len();
            let sequential = detect_sequential_pattern(&track.requests);
            (minute, hour, sequential)
        };

        if sequential {
            reasons.push(SuspicionReason::SequentialTiming);
        }

        let mut verdict = Ok(());
        if minute_count > PER_MINUTE_MAX {
            reasons.push(SuspicionReason::PerMinuteOverflow);
            verdict = Err(AppError::RateLimited);
        } else if hour_count > PER_HOUR_MAX {
            reasons.push(SuspicionReason::PerHourOverflow);
            verdict = Err(AppError::RateLimited);
        }

        let blocked = self.apply_reasons(ip, &reasons).await;
        if blocked {
            return Err(AppError::Forbidden);
        }
        verdict
    }

    /// Tag an IP with a reason outside the normal request path (honeypots,
    /// dictionary download attempts). Returns whether the IP is now blocked.
    pub async fn note(&self, ip: &str, reason: SuspicionReason) -> bool {
        self.apply_reasons(ip, &[reason]).await
    }

    async fn apply_reasons(&self, ip: &str, reasons: &[SuspicionReason]) -> bool {
        if reasons.is_empty() {
            return self.is_blocked(ip).await;
        }
        let score = {
            let mut clients = self.clients.lock().await;
            let track = clients.entry(ip.to_string()).or_default();
            for reason in reasons {
                track.suspicion += reason.weight();
                tracing::warn!(
                    "suspicion {} (+{}) for {ip}, score now {}",
                    reason.label(),
                    reason.weight(),
                    track.suspicion
                );
            }
            track.suspicion
        };
        if score >= BLOCK_THRESHOLD {
            let mut blocked = self.blocked.lock().await;
            if blocked.insert(ip.to_string()) {
                tracing::warn!("blocking {ip}, suspicion score {score}");
            }
            true
        } else {
            false
        }
    }

    pub async fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.lock().await.contains(ip)
    }

    /// Issue a fresh 256-bit API token bound to the caller's IP.
    pub async fn generate_token(&self, ip: &str, now_ms: i64) -> String {
        let bytes: [u8; 32] = rand::rng().random();
        let token = bytes.iter().fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        });

        let mut tokens = self.tokens.lock().await;
        tokens.insert(
            token.clone(),
            ApiToken {
                ip: ip.to_string(),
                issued_at_ms: now_ms,
                uses: 0,
            },
        );
        drop(tokens);

        let mut clients = self.clients.lock().await;
        let track = clients.entry(ip.to_string()).or_default();
        track.tokens.insert(token.clone());
        track.last_seen_ms = now_ms;

        token
    }

    /// Fixed-cadence maintenance: decay every non-zero score by one, drop
    /// IPs below half the block threshold from the block set, forget IPs
    /// idle for more than a day and prune expired tokens.
    pub async fn sweep(&self, now_ms: i64) {
        {
            let mut clients = self.clients.lock().await;
            let mut blocked = self.blocked.lock().await;
            for (ip, track) in clients.iter_mut() {
                if track.suspicion > 0 {
                    track.suspicion -= 1;
                }
                if track.suspicion < UNBLOCK_THRESHOLD && blocked.remove(ip) {
                    tracing::info!("unblocking {ip}, suspicion decayed to {}", track.suspicion);
                }
            }
            clients.retain(|_, track| now_ms - track.last_seen_ms <= FORGET_IDLE_MS);
        }

        let mut tokens = self.tokens.lock().await;
        tokens.retain(|_, t| now_ms - t.issued_at_ms <= TOKEN_TTL_MS);
    }

    pub async fn unblock(&self, ip: &str) -> bool {
        let removed = self.blocked.lock().await.remove(ip);
        if removed {
            let mut clients = self.clients.lock().await;
            if let Some(track) = clients.get_mut(ip) {
                track.suspicion = 0;
            }
        }
        removed
    }

    pub async fn blocked_ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.blocked.lock().await.iter().cloned().collect();
        ips.sort();
        ips
    }

    /// Admin snapshot: tracked IPs, scores, token counts.
    pub async fn stats(&self) -> serde_json::Value {
        let clients = self.clients.lock().await;
        let blocked = self.blocked.lock().await;
        let tokens = self.tokens.lock().await;

        let mut per_ip: Vec<serde_json::Value> = clients
            .iter()
            .map(|(ip, track)| {
                serde_json::json!({
                    "ip": ip,
                    "suspicionScore": track.suspicion,
                    "recentRequests": track.requests.len(),
                    "tokens": track.tokens.len(),
                    "blocked": blocked.contains(ip),
                })
            })
            .collect();
        per_ip.sort_by_key(|v| {
            -v.get("suspicionScore").and_then(|s| s.as_i64()).unwrap_or(0)
        });

        serde_json::json!({
            "trackedIps": clients.len(),
            "blockedIps": blocked.len(),
            "activeTokens": tokens.len(),
            "clients": per_ip,
        })
    }
}

fn is_suspicious_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    ua.is_empty()
        || ["python", "curl", "wget", "scrapy", "httpclient", "go-http", "bot", "spider"]
            .iter()
            .any(|pattern| ua.contains(pattern))
}

/// Over the last 20 requests: mean inter-request interval < 2 s and stddev
/// < 500 ms with at least 10 samples marks scripted traffic.
fn detect_sequential_pattern(requests: &[RequestEntry]) -> bool {
    let window: Vec<i64> = requests
        .iter()
        .rev()
        .take(SEQUENTIAL_WINDOW)
        .map(|r| r.at_ms)
        .collect();
    if window.len() < SEQUENTIAL_MIN_SAMPLES + 1 {
        return false;
    }
    // window is newest-first
    let intervals: Vec<f64> = window
        .windows(2)
        .map(|pair| (pair[0] - pair[1]) as f64)
        .collect();
    if intervals.len() < SEQUENTIAL_MIN_SAMPLES {
        return false;
    }
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let variance = intervals
        .iter()
        .map(|i| (i - mean).powi(2))
        .sum::<f64>()
        / intervals.len() as f64;
    mean < SEQUENTIAL_MEAN_MS && variance.sqrt() < SEQUENTIAL_STDDEV_MS
}
