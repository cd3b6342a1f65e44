// Room registry: create/get/list/delete plus the membership mutations.

use crate::room::error::RoomError;
use crate::room::model::{GamePhase, Player, Room, RoomSettings, RoomSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Idle non-playing rooms older than this are reaped.
const ROOM_IDLE_MS: i64 = 3_600_000;

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Token already seated: socket refreshed, disconnect flag cleared.
    Reconnected { player_index: usize },
    /// Mid-game return of the historical host or a recently-left player.
    Rejoined { player_index: usize },
    /// Fresh seat in a lobby room.
    Joined { player_index: usize },
    /// Game in progress: queued for promotion at the next game end.
    Spectator,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub player: Player,
    pub was_host: bool,
    pub new_host: Option<String>,
    pub room_deleted: bool,
    pub was_current_turn: bool,
    /// The leaver was only waiting as a pending spectator.
    pub was_spectator: bool,
}

pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Create a room. A supplied id makes recreation idempotent for a host
    /// returning after a server restart: if the id is already live under the
    /// same host token the existing room is returned.
    pub async fn create(
        &self,
        requested_id: Option<String>,
        name: String,
        host: Player,
        settings: RoomSettings,
        now_ms: i64,
    ) -> (String, SharedRoom) {
        let mut rooms = self.rooms.lock().await;

        if let Some(id) = &requested_id {
            if let Some(existing) = rooms.get(id) {
                let same_host = {
                    let room = existing.lock().await;
                    room.host_token == host.token
                };
                if same_host {
                    return (id.clone(), existing.clone());
                }
            }
        }

        let id = match requested_id {
            Some(id) if !rooms.contains_key(&id) => id,
            _ => Uuid::new_v4().to_string(),
        };
        let room = Arc::new(Mutex::new(Room::new(
            id.clone(),
            name,
            host,
            settings,
            now_ms,
        )));
        rooms.insert(id.clone(), room.clone());
        (id, room)
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    pub async fn remove(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.lock().await.remove(room_id)
    }

    pub async fn list_public(&self) -> Vec<RoomSummary> {
        let rooms: Vec<SharedRoom> = self.rooms.lock().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            summaries.push(room.lock().await.summary());
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Join evaluation, in order: reconnection, capacity, in-progress
    /// restrictions, fresh seat.
    pub async fn join(
        &self,
        room_id: &str,
        token: &str,
        socket_id: Uuid,
        name: &str,
        avatar: &str,
        was_host: bool,
        now_ms: i64,
    ) -> Result<(SharedRoom, JoinOutcome), RoomError> {
        let shared = self.get(room_id).await.ok_or(RoomError::NotFound)?;
        let mut room = shared.lock().await;
        room.last_activity_ms = now_ms;
        room.purge_recently_left(now_ms);

        // 1. Already seated: reconnection.
        if let Some(idx) = room.find_player(token) {
            let player = &mut room.players[idx];
            player.socket_id = Some(socket_id);
            player.disconnected = false;
            drop(room);
            return Ok((shared, JoinOutcome::Reconnected { player_index: idx }));
        }

        // 2. Capacity.
        if room.players.len() >= room.settings.max_players {
            return Err(RoomError::Full);
        }

        // 3. Game in progress: only the historical host or a recently-left
        // player may take a seat; everyone else waits as a spectator.
        if room.phase == GamePhase::Playing {
            let left_idx = room
                .recently_left
                .iter()
                .position(|l| l.player.token == token);
            let is_historical_host = was_host && room.host_token == token;

            if left_idx.is_none() && !is_historical_host {
                let mut spectator = Player::new(
                    token,
                    socket_id,
                    name,
                    avatar,
                    room.settings.starting_lives,
                    false,
                );
                spectator.is_ready = false;
                room.pending_spectators.push(spectator);
                drop(room);
                return Ok((shared, JoinOutcome::Spectator));
            }

            let mut player = match left_idx {
                // Restore the original mid-game state.
                Some(idx) => room.recently_left.remove(idx).player,
                None => Player::new(
                    token,
                    socket_id,
                    name,
                    avatar,
                    room.settings.starting_lives,
                    false,
                ),
            };
            player.socket_id = Some(socket_id);
            player.disconnected = false;
            player.is_host = room.host_token == token;
            room.players.push(player);
            let idx = room.players.len() - 1;
            room.normalize_current_index();
            drop(room);
            return Ok((shared, JoinOutcome::Rejoined { player_index: idx }));
        }

        // 4. Fresh seat.
        let player = Player::new(
            token,
            socket_id,
            name,
            avatar,
            room.settings.starting_lives,
            false,
        );
        room.players.push(player);
        let idx = room.players.len() - 1;
        drop(room);
        Ok((shared, JoinOutcome::Joined { player_index: idx }))
    }

    /// Remove a player. Mid-game leavers are snapshotted into
    /// `recentlyLeft`; an empty room is deleted; a departing host promotes
    /// the first remaining seat.
    pub async fn leave(
        &self,
        room_id: &str,
        token: &str,
        now_ms: i64,
    ) -> Result<LeaveOutcome, RoomError> {
        let shared = self.get(room_id).await.ok_or(RoomError::NotFound)?;
        let mut room = shared.lock().await;

        let Some(idx) = room.find_player(token) else {
            // Not seated: maybe waiting as a spectator.
            let waiting_idx = room
                .pending_spectators
                .iter()
                .position(|p| p.token == token)
                .ok_or(RoomError::NotInRoom)?;
            let player = room.pending_spectators.remove(waiting_idx);
            return Ok(LeaveOutcome {
                player,
                was_host: false,
                new_host: None,
                room_deleted: false,
                was_current_turn: false,
                was_spectator: true,
            });
        };
        let was_current_turn = room.game.current_player_index == idx;
        let was_host = room.players[idx].is_host;

        let mut player = room.players.remove(idx);
        player.is_host = false;
        if room.phase == GamePhase::Playing {
            room.snapshot_recently_left(player.clone(), now_ms);
        }
        room.pending_spectators.retain(|p| p.token != token);

        if idx < room.game.current_player_index {
            room.game.current_player_index -= 1;
        }
        room.normalize_current_index();
        room.last_activity_ms = now_ms;

        let room_deleted = room.players.is_empty();
        let new_host = if room_deleted {
            None
        } else {
            room.promote_host_if_needed()
        };

        if room_deleted {
            room.signals.stop.notify_waiters();
            drop(room);
            self.rooms.lock().await.remove(room_id);
        }

        Ok(LeaveOutcome {
            player,
            was_host,
            new_host,
            room_deleted,
            was_current_turn,
            was_spectator: false,
        })
    }

    /// Fixed-cadence maintenance: purge rejoin snapshots and reap rooms that
    /// are empty or idle past the threshold outside a running game. Returns
    /// the reaped room ids.
    pub async fn sweep(&self, now_ms: i64) -> Vec<String> {
        let rooms: Vec<(String, SharedRoom)> = self
            .rooms
            .lock()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();

        let mut reaped = Vec::new();
        for (id, shared) in rooms {
            let mut room = shared.lock().await;
            room.purge_recently_left(now_ms);
            let idle = now_ms - room.last_activity_ms > ROOM_IDLE_MS;
            if room.players.is_empty() || (idle && room.phase != GamePhase::Playing) {
                room.signals.stop.notify_waiters();
                reaped.push(id);
            }
        }

        if !reaped.is_empty() {
            let mut map = self.rooms.lock().await;
            for id in &reaped {
                map.remove(id);
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Player {
        Player::new("host-tok", Uuid::new_v4(), "host", "a1", 2, true)
    }

    async fn registry_with_room() -> (RoomRegistry, String) {
        let registry = RoomRegistry::new();
        let (id, _) = registry
            .create(None, "Salon".into(), host(), RoomSettings::default(), 0)
            .await;
        (registry, id)
    }

    #[tokio::test]
    async fn test_create_join_leave_roundtrip() {
        let (registry, id) = registry_with_room().await;

        let (_, outcome) = registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 0)
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Joined { player_index: 1 });

        let outcome = registry.leave(&id, "p2", 0).await.unwrap();
        assert!(!outcome.room_deleted);
        assert!(outcome.new_host.is_none());

        // Host alone leaving deletes the room.
        let outcome = registry.leave(&id, "host-tok", 0).await.unwrap();
        assert!(outcome.room_deleted);
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let registry = RoomRegistry::new();
        let settings = RoomSettings {
            max_players: 2,
            ..Default::default()
        };
        let (id, _) = registry
            .create(None, "Salon".into(), host(), settings, 0)
            .await;
        registry
            .join(&id, "p2", Uuid::new_v4(), "b", "a2", false, 0)
            .await
            .unwrap();
        let err = registry
            .join(&id, "p3", Uuid::new_v4(), "c", "a3", false, 0)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::Full);
    }

    #[tokio::test]
    async fn test_rejoin_is_reconnection_not_new_seat() {
        let (registry, id) = registry_with_room().await;
        let s2 = Uuid::new_v4();
        let (shared, outcome) = registry
            .join(&id, "host-tok", s2, "host", "a1", false, 0)
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Reconnected { player_index: 0 });
        let room = shared.lock().await;
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].socket_id, Some(s2));
    }

    #[tokio::test]
    async fn test_mid_game_join_becomes_spectator() {
        let (registry, id) = registry_with_room().await;
        {
            let shared = registry.get(&id).await.unwrap();
            shared.lock().await.phase = GamePhase::Playing;
        }
        let (shared, outcome) = registry
            .join(&id, "p2", Uuid::new_v4(), "late", "a2", false, 0)
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Spectator);
        assert_eq!(shared.lock().await.pending_spectators.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_game_rejoin_restores_state() {
        let (registry, id) = registry_with_room().await;
        registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 0)
            .await
            .unwrap();
        {
            let shared = registry.get(&id).await.unwrap();
            let mut room = shared.lock().await;
            room.phase = GamePhase::Playing;
            room.players[1].lives = 1;
            room.players[1].words_found = 3;
        }

        registry.leave(&id, "p2", 1_000).await.unwrap();

        let (shared, outcome) = registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 30_000)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Rejoined { .. }));
        let room = shared.lock().await;
        let p2 = &room.players[room.find_player("p2").unwrap()];
        assert_eq!(p2.lives, 1);
        assert_eq!(p2.words_found, 3);
        assert!(room.recently_left.is_empty());
    }

    #[tokio::test]
    async fn test_recently_left_expires() {
        let (registry, id) = registry_with_room().await;
        registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 0)
            .await
            .unwrap();
        {
            let shared = registry.get(&id).await.unwrap();
            shared.lock().await.phase = GamePhase::Playing;
        }
        registry.leave(&id, "p2", 0).await.unwrap();

        // Past the 60s window the seat is gone; the returning player waits
        // as a spectator.
        let (_, outcome) = registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 61_000)
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Spectator);
    }

    #[tokio::test]
    async fn test_host_leave_promotes_first_remaining() {
        let (registry, id) = registry_with_room().await;
        registry
            .join(&id, "p2", Uuid::new_v4(), "peer", "a2", false, 0)
            .await
            .unwrap();
        let outcome = registry.leave(&id, "host-tok", 0).await.unwrap();
        assert!(outcome.was_host);
        assert_eq!(outcome.new_host.as_deref(), Some("peer"));

        let shared = registry.get(&id).await.unwrap();
        let room = shared.lock().await;
        assert_eq!(room.host_token, "p2");
        assert!(room.players[0].is_host);
    }

    #[tokio::test]
    async fn test_idempotent_recreate_with_supplied_id() {
        let registry = RoomRegistry::new();
        let (id, _) = registry
            .create(
                Some("fixed-id".into()),
                "Salon".into(),
                host(),
                RoomSettings::default(),
                0,
            )
            .await;
        assert_eq!(id, "fixed-id");

        // Same host, same id: same room.
        let (id2, _) = registry
            .create(
                Some("fixed-id".into()),
                "Salon".into(),
                host(),
                RoomSettings::default(),
                0,
            )
            .await;
        assert_eq!(id2, "fixed-id");

        // Different host asking for a taken id gets a fresh room.
        let other = Player::new("other-tok", Uuid::new_v4(), "x", "a1", 2, true);
        let (id3, _) = registry
            .create(
                Some("fixed-id".into()),
                "Salon 2".into(),
                other,
                RoomSettings::default(),
                0,
            )
            .await;
        assert_ne!(id3, "fixed-id");
    }

    #[tokio::test]
    async fn test_sweep_reaps_idle_rooms() {
        let (registry, id) = registry_with_room().await;
        let reaped = registry.sweep(ROOM_IDLE_MS + 1).await;
        assert_eq!(reaped, vec![id.clone()]);
        assert!(registry.get(&id).await.is_none());
    }
}
