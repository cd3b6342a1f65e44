//! WebSocket message types (client -> server, server -> client).
//!
//! Every client message carries enough context to be dispatched statelessly;
//! the session token is bound once via `register` and resolved per socket.

use crate::game::scenario::Scenario;
use crate::room::{GamePhase, Player, RoomSettings, RoomSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomData {
    /// Supplied by a host recreating their room after a server restart.
    pub room_id: Option<String>,
    pub name: String,
    pub player: PlayerData,
    #[serde(default)]
    pub settings: Option<RoomSettings>,
}

/// Messages sent from clients to the server socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Register {
        token: String,
    },
    GetRooms,
    CreateRoom {
        data: CreateRoomData,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        player_data: PlayerData,
        #[serde(default)]
        was_host: bool,
        #[serde(default)]
        staff_token: Option<String>,
    },
    LeaveRoom,
    #[serde(rename_all = "camelCase")]
    DeleteRoom {
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToggleReady {
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StartGame {
        room_id: String,
        #[serde(default)]
        scenario: Option<Scenario>,
    },
    /// Legacy client engines race the server for the next syllable; honored
    /// only outside the server-controlled window.
    #[serde(rename_all = "camelCase")]
    NewSyllable {
        room_id: String,
        player_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    SubmitWord {
        room_id: String,
        word: String,
        /// Client's idea of the syllable; ignored, the server uses its own.
        #[serde(default)]
        syllable: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LoseLife {
        room_id: String,
        player_id: String,
    },
    #[serde(rename_all = "camelCase")]
    EndGame {
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateBotCount {
        room_id: String,
        total_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        room_id: String,
        settings: RoomSettings,
    },
    #[serde(rename_all = "camelCase")]
    TypingUpdate {
        room_id: String,
        text: String,
        player_name: String,
        #[serde(default)]
        accepted: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        message: String,
        player_name: String,
        #[serde(default)]
        avatar: String,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default)]
        staff_token: Option<String>,
        #[serde(default)]
        is_bot: bool,
    },
    #[serde(rename_all = "camelCase")]
    SuicideRequest {
        room_id: String,
    },
}

/// Messages broadcast by the server to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    RoomsList {
        rooms: Vec<RoomSummary>,
    },
    RoomCreated {
        room: Value,
    },
    RoomJoined {
        room: Value,
    },
    JoinError {
        message: String,
    },
    JoinedAsSpectator {
        room: Value,
    },
    SpectatorsWaiting {
        count: usize,
        names: Vec<String>,
    },
    PlayerJoined {
        player: Player,
        players: Vec<Player>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_name: String,
        players: Vec<Player>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_host: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        player_name: String,
        game_paused: bool,
    },
    #[serde(rename_all = "camelCase")]
    PlayerReconnected {
        player_name: String,
        players: Vec<Player>,
    },
    PlayerReadyChanged {
        players: Vec<Player>,
    },
    #[serde(rename_all = "camelCase")]
    RoomDeleted {
        room_id: String,
    },
    GameStarted {
        room: Value,
    },
    #[serde(rename_all = "camelCase")]
    SyllableUpdate {
        syllable: String,
        player_index: usize,
        player: String,
        round_number: u32,
        /// Distinct-word count for the syllable, when the index knows it.
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    TimerUpdate {
        remaining: u64,
        total: u64,
    },
    #[serde(rename_all = "camelCase")]
    Timeout {
        socket_id: Option<uuid::Uuid>,
        player_name: String,
    },
    #[serde(rename_all = "camelCase")]
    WordAccepted {
        word: String,
        player_name: String,
        player_index: usize,
        words_found: u32,
    },
    WordRejected {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        word: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLostLife {
        player_name: String,
        player_index: usize,
        lives_left: u32,
    },
    #[serde(rename_all = "camelCase")]
    PlayerEliminated {
        player_name: String,
        player_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    TurnChanged {
        player_index: usize,
        player_name: String,
    },
    GamePaused {
        reason: String,
    },
    GameResumed {
        remaining: u64,
    },
    #[serde(rename_all = "camelCase")]
    GameOver {
        winner: Option<String>,
        players: Vec<Player>,
        game_state: GamePhase,
    },
    #[serde(rename_all = "camelCase")]
    PromotedToPlayer {
        player_name: String,
    },
    SettingsUpdated {
        settings: RoomSettings,
    },
    #[serde(rename_all = "camelCase")]
    PlayerTyping {
        player_name: String,
        text: String,
        accepted: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        player_name: String,
        avatar: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
        is_staff: bool,
        is_bot: bool,
        timestamp: i64,
    },
    Banned {
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("server message serialization failed: {e}");
            "{\"type\":\"error\",\"message\":\"serialization\"}".to_string()
        })
    }
}
