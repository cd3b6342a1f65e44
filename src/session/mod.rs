// Session registry: stable logical identity (client token) decoupled from
// transport identity (socket id).
//
// Sessions survive transport reconnects; the socket id changes every time.
// A disconnect bumps the session's generation counter so that staged
// grace-period callbacks can detect that a newer connection arrived and
// no-op.

use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub socket_id: Option<Uuid>,
    pub room_id: Option<String>,
    pub last_disconnect_ms: Option<i64>,
    /// Bumped on every disconnect; grace-period callbacks capture it and
    /// no-op when the live value differs.
    pub disconnect_gen: u64,
}

#[derive(Default)]
struct SessionMaps {
    by_token: HashMap<String, Session>,
    by_socket: HashMap<Uuid, String>,
}

pub struct SessionRegistry {
    inner: Mutex<SessionMaps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionMaps::default()),
        }
    }

    /// Bind a token to a socket. Rebinding an existing session detaches its
    /// previous socket; there is never more than one socket per token.
    pub async fn register(&self, token: &str, socket_id: Uuid) -> Session {
        let mut maps = self.inner.lock().await;

        // A socket re-registering under a new token releases its old one.
        if let Some(old_token) = maps.by_socket.get(&socket_id).cloned() {
            if old_token != token {
                if let Some(old) = maps.by_token.get_mut(&old_token) {
                    old.socket_id = None;
                }
                maps.by_socket.remove(&socket_id);
            }
        }

        if let Some(session) = maps.by_token.get_mut(token) {
            let old = session.socket_id.take();
            session.socket_id = Some(socket_id);
            session.last_disconnect_ms = None;
            let session = session.clone();
            if let Some(old) = old {
                maps.by_socket.remove(&old);
            }
            maps.by_socket.insert(socket_id, token.to_string());
            return session;
        }

        let session = Session {
            token: token.to_string(),
            socket_id: Some(socket_id),
            room_id: None,
            last_disconnect_ms: None,
            disconnect_gen: 0,
        };
        maps.by_token.insert(token.to_string(), session.clone());
        maps.by_socket.insert(socket_id, token.to_string());
        session
    }

    /// Transport loss: clear the socket binding but keep the session alive
    /// for grace-period lookups. Returns the token and the new generation.
    pub async fn unregister(&self, socket_id: Uuid, now_ms: i64) -> Option<(String, u64)> {
        let mut maps = self.inner.lock().await;
        let token = maps.by_socket.remove(&socket_id)?;
        let session = maps.by_token.get_mut(&token)?;
        // A newer socket may already have taken over this token.
        if session.socket_id == Some(socket_id) {
            session.socket_id = None;
            session.last_disconnect_ms = Some(now_ms);
            session.disconnect_gen += 1;
            Some((token.clone(), session.disconnect_gen))
        } else {
            None
        }
    }

    pub async fn token_by_socket(&self, socket_id: Uuid) -> Option<String> {
        let maps = self.inner.lock().await;
        maps.by_socket.get(&socket_id).cloned()
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        let maps = self.inner.lock().await;
        maps.by_token.get(token).cloned()
    }

    pub async fn set_room(&self, token: &str, room_id: Option<String>) {
        let mut maps = self.inner.lock().await;
        if let Some(session) = maps.by_token.get_mut(token) {
            session.room_id = room_id;
        }
    }

    /// True when the token currently has a live socket. Grace callbacks use
    /// this together with the generation check.
    pub async fn has_socket(&self, token: &str) -> bool {
        let maps = self.inner.lock().await;
        maps.by_token
            .get(token)
            .map(|s| s.socket_id.is_some())
            .unwrap_or(false)
    }

    pub async fn generation(&self, token: &str) -> Option<u64> {
        let maps = self.inner.lock().await;
        maps.by_token.get(token).map(|s| s.disconnect_gen)
    }

    /// Sessions still referencing a room, for reap-time consistency checks.
    pub async fn referenced_rooms(&self) -> Vec<(String, String)> {
        let maps = self.inner.lock().await;
        maps.by_token
            .values()
            .filter_map(|s| s.room_id.clone().map(|room| (s.token.clone(), room)))
            .collect()
    }

    /// Drop sessions with no socket, no room, and a disconnect older than
    /// `idle_ms`.
    pub async fn reap(&self, now_ms: i64, idle_ms: i64) -> usize {
        let mut maps = self.inner.lock().await;
        let before = maps.by_token.len();
        maps.by_token.retain(|_, s| {
            s.socket_id.is_some()
                || s.room_id.is_some()
                || s.last_disconnect_ms
                    .map(|at| now_ms - at <= idle_ms)
                    .unwrap_or(true)
        });
        before - maps.by_token.len()
    }
}
