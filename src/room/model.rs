// Room, player and per-game round state.
//
// Rooms reference players by token and sessions reference rooms by id; no
// back-pointers, every lookup goes through the registries.

use crate::game::scenario::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// Base turn duration before the per-room extra seconds.
pub const BASE_TURN_SECONDS: u64 = 8;
/// Window during which the server ignores legacy client syllable choices.
pub const SERVER_CONTROL_MS: u64 = 3_000;
/// Resume floor so a reconnected player gets a fair remainder.
pub const RESUME_FLOOR: Duration = Duration::from_secs(3);
/// Minimum delay between word submissions per session.
pub const SUBMIT_COOLDOWN_MS: i64 = 800;
/// Mid-game rejoin window for players who left.
pub const RECENTLY_LEFT_TTL_MS: i64 = 60_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Session token: the unit of identity. Never serialized to peers.
    #[serde(skip_serializing)]
    pub token: String,
    pub socket_id: Option<Uuid>,
    pub name: String,
    pub avatar: String,
    pub is_host: bool,
    pub is_ready: bool,
    pub lives: u32,
    pub words_found: u32,
    pub is_alive: bool,
    pub disconnected: bool,
}

impl Player {
    pub fn new(
        token: &str,
        socket_id: Uuid,
        name: &str,
        avatar: &str,
        lives: u32,
        is_host: bool,
    ) -> Self {
        Self {
            token: token.to_string(),
            socket_id: Some(socket_id),
            name: name.to_string(),
            avatar: avatar.to_string(),
            is_host,
            // The host is implicitly ready.
            is_ready: is_host,
            lives,
            words_found: 0,
            is_alive: true,
            disconnected: false,
        }
    }

    pub fn can_take_turn(&self) -> bool {
        self.is_alive && self.lives > 0 && !self.disconnected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub scenario: Option<Scenario>,
    pub max_players: usize,
    pub starting_lives: u32,
    pub extra_turn_seconds: u64,
    /// Practice syllables for the "train skip" scenario.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_syllables: Option<Vec<String>>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            scenario: None,
            max_players: 6,
            starting_lives: 2,
            extra_turn_seconds: 0,
            train_syllables: None,
        }
    }
}

impl RoomSettings {
    pub fn sanitized(mut self) -> Self {
        self.extra_turn_seconds = self.extra_turn_seconds.min(10);
        self.max_players = self.max_players.clamp(1, 16);
        self.starting_lives = self.starting_lives.clamp(1, 10);
        self
    }

    pub fn turn_total(&self) -> Duration {
        Duration::from_secs(BASE_TURN_SECONDS + self.extra_turn_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Lobby,
    Playing,
    Finished,
}

/// How the current turn ended, set by the handler before signalling the
/// game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFlag {
    /// Valid word: advance to the next player, then a new round.
    WordAccepted,
    /// Life already applied and the turn already advanced by the handler
    /// (manual life loss, eviction); just start the next round.
    Aborted,
}

#[derive(Debug)]
pub struct GameRound {
    pub current_syllable: Option<String>,
    pub current_player_index: usize,
    pub round_number: u32,
    pub started_at_ms: Option<i64>,
    /// Monotonic deadline; `None` while idle or paused.
    pub deadline: Option<Instant>,
    pub timer_total: Duration,
    pub paused: bool,
    pub paused_remaining: Option<Duration>,
    pub used_syllables: HashSet<String>,
    pub server_controlled_until: Option<Instant>,
    pub turn_flag: Option<TurnFlag>,
    /// Last submission time per token, for the per-session cooldown.
    pub last_submit_ms: HashMap<String, i64>,
}

impl Default for GameRound {
    fn default() -> Self {
        Self {
            current_syllable: None,
            current_player_index: 0,
            round_number: 0,
            started_at_ms: None,
            deadline: None,
            timer_total: Duration::from_secs(BASE_TURN_SECONDS),
            paused: false,
            paused_remaining: None,
            used_syllables: HashSet::new(),
            server_controlled_until: None,
            turn_flag: None,
            last_submit_ms: HashMap::new(),
        }
    }
}

/// Wakeup channels between the event handlers and the room's game loop.
/// The loop is the only owner of the turn timer.
#[derive(Debug, Default)]
pub struct RoomSignals {
    pub turn_over: Notify,
    pub stop: Notify,
}

#[derive(Debug, Clone)]
pub struct LeftPlayer {
    pub player: Player,
    pub left_at_ms: i64,
}

#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub host_token: String,
    pub players: Vec<Player>,
    pub pending_spectators: Vec<Player>,
    pub recently_left: Vec<LeftPlayer>,
    pub settings: RoomSettings,
    pub phase: GamePhase,
    pub game: GameRound,
    pub created_at_ms: i64,
    pub last_activity_ms: i64,
    /// Host-local bots inflate the advertised player count.
    pub display_player_count: usize,
    pub signals: Arc<RoomSignals>,
}

/// Lobby-browser view of a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub game_state: GamePhase,
    pub scenario: Option<Scenario>,
}

impl Room {
    pub fn new(id: String, name: String, host: Player, settings: RoomSettings, now_ms: i64) -> Self {
        Self {
            id,
            name,
            host_token: host.token.clone(),
            players: vec![host],
            pending_spectators: Vec::new(),
            recently_left: Vec::new(),
            settings: settings.sanitized(),
            phase: GamePhase::Lobby,
            game: GameRound::default(),
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            display_player_count: 0,
            signals: Arc::new(RoomSignals::default()),
        }
    }

    pub fn find_player(&self, token: &str) -> Option<usize> {
        self.players.iter().position(|p| p.token == token)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.game.current_player_index)
    }

    pub fn alive_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.is_alive && p.lives > 0)
            .count()
    }

    /// Keep `currentPlayerIndex` valid after any membership mutation.
    pub fn normalize_current_index(&mut self) {
        if self.players.is_empty() {
            self.game.current_player_index = 0;
        } else {
            self.game.current_player_index %= self.players.len();
        }
    }

    /// Linear scan forward from the next seat, skipping eliminated and
    /// disconnected players. Bounded by the player count; `false` when no
    /// seat qualifies.
    pub fn advance_to_next_alive(&mut self) -> bool {
        let n = self.players.len();
        if n == 0 {
            return false;
        }
        for step in 1..=n {
            let idx = (self.game.current_player_index + step) % n;
            if self.players[idx].can_take_turn() {
                self.game.current_player_index = idx;
                return true;
            }
        }
        false
    }

    /// Re-establish the single-host invariant after the host left. Returns
    /// the new host's name when a promotion happened.
    pub fn promote_host_if_needed(&mut self) -> Option<String> {
        if self.players.is_empty() || self.players.iter().any(|p| p.is_host) {
            return None;
        }
        self.players[0].is_host = true;
        self.players[0].is_ready = true;
        self.host_token = self.players[0].token.clone();
        Some(self.players[0].name.clone())
    }

    /// Reset every seat for the next lobby and promote waiting spectators.
    /// Returns the promoted players' names.
    pub fn reset_for_lobby(&mut self) -> Vec<String> {
        let promoted: Vec<String> = self
            .pending_spectators
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let spectators = std::mem::take(&mut self.pending_spectators);
        self.players.extend(spectators);

        for player in &mut self.players {
            player.lives = self.settings.starting_lives;
            player.words_found = 0;
            player.is_alive = true;
            player.is_ready = player.is_host;
        }
        self.game = GameRound::default();
        self.phase = GamePhase::Lobby;
        promoted
    }

    pub fn snapshot_recently_left(&mut self, player: Player, now_ms: i64) {
        self.recently_left.retain(|l| l.player.token != player.token);
        self.recently_left.push(LeftPlayer {
            player,
            left_at_ms: now_ms,
        });
    }

    pub fn purge_recently_left(&mut self, now_ms: i64) {
        self.recently_left
            .retain(|l| now_ms - l.left_at_ms <= RECENTLY_LEFT_TTL_MS);
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            player_count: self.players.len().max(self.display_player_count),
            max_players: self.settings.max_players,
            game_state: self.phase,
            scenario: self.settings.scenario,
        }
    }

    /// Full state for a joining or reconnecting client.
    pub fn state_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "players": self.players,
            "settings": self.settings,
            "gameState": self.phase,
            "game": {
                "currentSyllable": self.game.current_syllable,
                "currentPlayerIndex": self.game.current_player_index,
                "roundNumber": self.game.round_number,
                "paused": self.game.paused,
            },
        })
    }
}
