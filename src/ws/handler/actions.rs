// Game coordinator: maps inbound socket events to room mutations and
// broadcasts. Every event is dispatched with the caller's resolved session
// token; authorization is token-based throughout.

use crate::dictionary::normalize;
use crate::game::scheduler;
use crate::room::registry::SharedRoom;
use crate::room::{
    GamePhase, JoinOutcome, Player, Room, RoomError, TurnFlag, model::SUBMIT_COOLDOWN_MS,
};
use crate::state::AppState;
use crate::ws::core::hub;
use crate::ws::messages::{ClientMessage, CreateRoomData, PlayerData, ServerMessage};
use uuid::Uuid;

const CHAT_MAX_CHARS: usize = 300;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub async fn dispatch(state: &AppState, socket_id: Uuid, ip: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::Register { token } => register(state, socket_id, &token).await,
        ClientMessage::GetRooms => {
            let rooms = state.rooms.list_public().await;
            hub::send_to_socket(state, socket_id, &ServerMessage::RoomsList { rooms }).await;
        }
        ClientMessage::CreateRoom { data } => create_room(state, socket_id, ip, data).await,
        ClientMessage::JoinRoom {
            room_id,
            player_data,
            was_host,
            staff_token: _,
        } => join_room(state, socket_id, ip, &room_id, player_data, was_host).await,
        ClientMessage::LeaveRoom => leave_room(state, socket_id).await,
        ClientMessage::DeleteRoom { room_id } => delete_room(state, socket_id, &room_id).await,
        ClientMessage::ToggleReady { room_id } => toggle_ready(state, socket_id, &room_id).await,
        ClientMessage::StartGame { room_id, scenario } => {
            start_game(state, socket_id, &room_id, scenario).await
        }
        ClientMessage::NewSyllable {
            room_id,
            player_index,
        } => new_syllable(state, socket_id, &room_id, player_index).await,
        ClientMessage::SubmitWord { room_id, word, .. } => {
            submit_word(state, socket_id, &room_id, &word).await
        }
        ClientMessage::LoseLife { room_id, player_id } => {
            lose_life(state, socket_id, &room_id, &player_id).await
        }
        ClientMessage::EndGame { room_id } => end_game(state, socket_id, &room_id).await,
        ClientMessage::UpdateBotCount {
            room_id,
            total_count,
        } => update_bot_count(state, socket_id, &room_id, total_count).await,
        ClientMessage::UpdateSettings { room_id, settings } => {
            update_settings(state, socket_id, &room_id, settings).await
        }
        ClientMessage::TypingUpdate {
            room_id,
            text,
            player_name,
            accepted,
        } => typing_update(state, socket_id, &room_id, text, player_name, accepted).await,
        ClientMessage::ChatMessage {
            room_id,
            message,
            player_name,
            avatar,
            reply_to,
            staff_token,
            is_bot,
        } => {
            chat_message(
                state,
                socket_id,
                &room_id,
                message,
                player_name,
                avatar,
                reply_to,
                staff_token,
                is_bot,
            )
            .await
        }
        ClientMessage::SuicideRequest { room_id } => {
            suicide_request(state, socket_id, &room_id).await
        }
    }
}

async fn send_error(state: &AppState, socket_id: Uuid, message: impl Into<String>) {
    hub::send_to_socket(
        state,
        socket_id,
        &ServerMessage::Error {
            message: message.into(),
        },
    )
    .await;
}

/// Resolve the caller's session token; every event except `register`
/// requires one.
async fn require_token(state: &AppState, socket_id: Uuid) -> Option<String> {
    let token = state.sessions.token_by_socket(socket_id).await;
    if token.is_none() {
        send_error(state, socket_id, "session non enregistrée").await;
    }
    token
}

async fn require_room(state: &AppState, socket_id: Uuid, room_id: &str) -> Option<SharedRoom> {
    let room = state.rooms.get(room_id).await;
    if room.is_none() {
        send_error(state, socket_id, RoomError::NotFound.to_string()).await;
    }
    room
}

// ---- session ---------------------------------------------------------------

async fn register(state: &AppState, socket_id: Uuid, token: &str) {
    if token.is_empty() {
        send_error(state, socket_id, "token manquant").await;
        return;
    }
    let session = state.sessions.register(token, socket_id).await;
    tracing::debug!("registered session for socket {socket_id}");

    // Socket-level reconnection: re-attach to the room the session references.
    let Some(room_id) = session.room_id else {
        return;
    };
    let Some(shared) = state.rooms.get(&room_id).await else {
        state.sessions.set_room(token, None).await;
        return;
    };
    let mut room = shared.lock().await;
    let Some(idx) = room.find_player(token) else {
        drop(room);
        state.sessions.set_room(token, None).await;
        return;
    };
    room.players[idx].socket_id = Some(socket_id);
    room.players[idx].disconnected = false;
    let player_name = room.players[idx].name.clone();
    hub::broadcast_room(
        state,
        &room,
        &ServerMessage::PlayerReconnected {
            player_name,
            players: room.players.clone(),
        },
    )
    .await;
    resume_if_waiting_for(state, &mut room, token).await;
}

/// A paused round resumes when the player it paused for is back.
async fn resume_if_waiting_for(state: &AppState, room: &mut Room, token: &str) {
    if room.phase == GamePhase::Playing
        && room.game.paused
        && room.current_player().map(|p| p.token.as_str()) == Some(token)
    {
        scheduler::resume_round(state, room).await;
    }
}

// ---- room lifecycle --------------------------------------------------------

async fn create_room(state: &AppState, socket_id: Uuid, ip: &str, data: CreateRoomData) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    // A seat in a previous room does not survive creating a new one.
    if let Some(prev) = state.sessions.get(&token).await.and_then(|s| s.room_id) {
        remove_from_room(state, &prev, &token).await;
    }
    let settings = data.settings.unwrap_or_default().sanitized();
    let host = Player::new(
        &token,
        socket_id,
        &data.player.name,
        &data.player.avatar,
        settings.starting_lives,
        true,
    );
    let (room_id, shared) = state
        .rooms
        .create(data.room_id, data.name, host, settings, now_ms())
        .await;
    state.sessions.set_room(&token, Some(room_id.clone())).await;
    state.stores.record_user(ip, &data.player.name).await;

    let payload = shared.lock().await.state_payload();
    hub::send_to_socket(state, socket_id, &ServerMessage::RoomCreated { room: payload }).await;
    hub::broadcast_rooms_list(state).await;
    tracing::info!("room {room_id} created");
}

async fn join_room(
    state: &AppState,
    socket_id: Uuid,
    ip: &str,
    room_id: &str,
    player_data: PlayerData,
    was_host: bool,
) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    // Joining elsewhere vacates any previous seat; rejoining the same room
    // is the reconnection path.
    if let Some(prev) = state.sessions.get(&token).await.and_then(|s| s.room_id) {
        if prev != room_id {
            remove_from_room(state, &prev, &token).await;
        }
    }
    let result = state
        .rooms
        .join(
            room_id,
            &token,
            socket_id,
            &player_data.name,
            &player_data.avatar,
            was_host,
            now_ms(),
        )
        .await;

    let (shared, outcome) = match result {
        Ok(ok) => ok,
        Err(e) => {
            hub::send_to_socket(
                state,
                socket_id,
                &ServerMessage::JoinError {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    state.sessions.set_room(&token, Some(room_id.to_string())).await;
    state.stores.record_user(ip, &player_data.name).await;

    let mut room = shared.lock().await;
    match outcome {
        JoinOutcome::Reconnected { player_index } | JoinOutcome::Rejoined { player_index } => {
            let payload = room.state_payload();
            hub::send_to_socket(state, socket_id, &ServerMessage::RoomJoined { room: payload })
                .await;
            let player_name = room.players[player_index].name.clone();
            hub::broadcast_room(
                state,
                &room,
                &ServerMessage::PlayerReconnected {
                    player_name,
                    players: room.players.clone(),
                },
            )
            .await;
            resume_if_waiting_for(state, &mut room, &token).await;
        }
        JoinOutcome::Joined { player_index } => {
            let payload = room.state_payload();
            hub::send_to_socket(state, socket_id, &ServerMessage::RoomJoined { room: payload })
                .await;
            let player = room.players[player_index].clone();
            hub::broadcast_room(
                state,
                &room,
                &ServerMessage::PlayerJoined {
                    player,
                    players: room.players.clone(),
                },
            )
            .await;
        }
        JoinOutcome::Spectator => {
            let payload = room.state_payload();
            hub::send_to_socket(
                state,
                socket_id,
                &ServerMessage::JoinedAsSpectator { room: payload },
            )
            .await;
            let names: Vec<String> = room
                .pending_spectators
                .iter()
                .map(|p| p.name.clone())
                .collect();
            hub::broadcast_room(
                state,
                &room,
                &ServerMessage::SpectatorsWaiting {
                    count: names.len(),
                    names,
                },
            )
            .await;
        }
    }
    drop(room);
    hub::broadcast_rooms_list(state).await;
}

async fn leave_room(state: &AppState, socket_id: Uuid) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(room_id) = state.sessions.get(&token).await.and_then(|s| s.room_id) else {
        return;
    };
    remove_from_room(state, &room_id, &token).await;
}

/// Shared removal path for explicit leaves and grace-window evictions.
pub async fn remove_from_room(state: &AppState, room_id: &str, token: &str) {
    let outcome = match state.rooms.leave(room_id, token, now_ms()).await {
        Ok(outcome) => outcome,
        Err(_) => return,
    };
    state.sessions.set_room(token, None).await;

    if outcome.was_spectator {
        if let Some(shared) = state.rooms.get(room_id).await {
            let room = shared.lock().await;
            let names: Vec<String> = room
                .pending_spectators
                .iter()
                .map(|p| p.name.clone())
                .collect();
            hub::broadcast_room(
                state,
                &room,
                &ServerMessage::SpectatorsWaiting {
                    count: names.len(),
                    names,
                },
            )
            .await;
        }
        return;
    }

    if !outcome.room_deleted {
        if let Some(shared) = state.rooms.get(room_id).await {
            let mut room = shared.lock().await;
            hub::broadcast_room(
                state,
                &room,
                &ServerMessage::PlayerLeft {
                    player_name: outcome.player.name.clone(),
                    players: room.players.clone(),
                    new_host: outcome.new_host.clone(),
                },
            )
            .await;

            // The departed player held the turn: skip to the next seat
            // without a life penalty.
            if room.phase == GamePhase::Playing && outcome.was_current_turn {
                room.game.paused = false;
                room.game.paused_remaining = None;
                room.game.deadline = None;
                room.game.turn_flag = Some(TurnFlag::Aborted);
                room.signals.turn_over.notify_one();
            }
        }
    }
    hub::broadcast_rooms_list(state).await;
}

async fn delete_room(state: &AppState, socket_id: Uuid, room_id: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let member_tokens: Vec<String> = {
        let room = shared.lock().await;
        if room.host_token != token {
            drop(room);
            send_error(state, socket_id, RoomError::NotHost.to_string()).await;
            return;
        }
        hub::broadcast_room(
            state,
            &room,
            &ServerMessage::RoomDeleted {
                room_id: room_id.to_string(),
            },
        )
        .await;
        room.signals.stop.notify_waiters();
        room.players
            .iter()
            .chain(room.pending_spectators.iter())
            .map(|p| p.token.clone())
            .collect()
    };

    state.rooms.remove(room_id).await;
    for member in member_tokens {
        state.sessions.set_room(&member, None).await;
    }
    hub::broadcast_rooms_list(state).await;
    tracing::info!("room {room_id} deleted by host");
}

async fn toggle_ready(state: &AppState, socket_id: Uuid, room_id: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    let Some(idx) = room.find_player(&token) else {
        return;
    };
    room.players[idx].is_ready = !room.players[idx].is_ready;
    hub::broadcast_room(
        state,
        &room,
        &ServerMessage::PlayerReadyChanged {
            players: room.players.clone(),
        },
    )
    .await;
}

// ---- game lifecycle --------------------------------------------------------

async fn start_game(
    state: &AppState,
    socket_id: Uuid,
    room_id: &str,
    scenario: Option<crate::game::scenario::Scenario>,
) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    {
        let mut room = shared.lock().await;
        if room.host_token != token {
            drop(room);
            send_error(state, socket_id, RoomError::NotHost.to_string()).await;
            return;
        }
        if room.phase == GamePhase::Playing {
            drop(room);
            send_error(state, socket_id, RoomError::InProgress.to_string()).await;
            return;
        }
        if room.players.len() < 2 {
            drop(room);
            send_error(state, socket_id, RoomError::NeedAtLeast(2).to_string()).await;
            return;
        }

        if scenario.is_some() {
            room.settings.scenario = scenario;
        }
        room.game = Default::default();
        let starting_lives = room.settings.starting_lives;
        for player in &mut room.players {
            player.lives = starting_lives;
            player.words_found = 0;
            player.is_alive = true;
        }
        room.phase = GamePhase::Playing;
        room.last_activity_ms = now_ms();

        let payload = room.state_payload();
        hub::broadcast_room(state, &room, &ServerMessage::GameStarted { room: payload }).await;
    }

    tokio::spawn(scheduler::run_game_loop(state.clone(), shared));
    hub::broadcast_rooms_list(state).await;
    tracing::info!("game started in room {room_id}");
}

/// Legacy client engines may race the server with their own syllable choice
/// right after a round starts. Honoring them only outside the
/// server-controlled window keeps the scenario filter authoritative.
async fn new_syllable(state: &AppState, socket_id: Uuid, room_id: &str, player_index: usize) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    if room.find_player(&token).is_none() || room.phase != GamePhase::Playing {
        return;
    }
    if let Some(until) = room.game.server_controlled_until {
        if tokio::time::Instant::now() < until {
            tracing::debug!("ignoring client syllable during server-controlled window");
            return;
        }
    }
    if !room.players.is_empty() {
        room.game.current_player_index = player_index % room.players.len();
    }
    room.game.deadline = None;
    room.game.turn_flag = Some(TurnFlag::Aborted);
    room.signals.turn_over.notify_one();
}

async fn submit_word(state: &AppState, socket_id: Uuid, room_id: &str, word: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    if room.phase != GamePhase::Playing {
        return;
    }

    // One submission per 800ms per session, counted on every attempt.
    let now = now_ms();
    let last = room.game.last_submit_ms.insert(token.clone(), now);
    if let Some(last) = last {
        if now - last < SUBMIT_COOLDOWN_MS {
            drop(room);
            hub::send_to_socket(
                state,
                socket_id,
                &ServerMessage::WordRejected {
                    reason: RoomError::TooFast.to_string(),
                    word: None,
                },
            )
            .await;
            return;
        }
    }

    let Some(current) = room.current_player() else {
        return;
    };
    let current_token = current.token.clone();
    // Callers answer only their own turn. The host may stand in for a seat
    // with no live session behind it (a bot it drives locally), never for a
    // connected player.
    if current_token != token {
        let host_driving_bot = room.host_token == token
            && !state.sessions.has_socket(&current_token).await;
        if !host_driving_bot {
            drop(room);
            hub::send_to_socket(
                state,
                socket_id,
                &ServerMessage::WordRejected {
                    reason: RoomError::NotYourTurn.to_string(),
                    word: None,
                },
            )
            .await;
            return;
        }
    }

    let Some(syllable) = room.game.current_syllable.clone() else {
        return;
    };
    if room.game.deadline.is_none() && !room.game.paused {
        // Round already resolved; late submission.
        return;
    }

    let normalized = normalize(word);
    let reason = if !normalized.contains(&syllable) {
        Some(format!("Le mot ne contient pas \"{syllable}\""))
    } else {
        match state.dictionary.get() {
            None => Some("Dictionnaire en cours de chargement".to_string()),
            Some(index) if !index.contains(&normalized) => {
                Some(format!("\"{normalized}\" n'est pas dans le dictionnaire"))
            }
            Some(_) => None,
        }
    };

    if let Some(reason) = reason {
        hub::broadcast_room(
            state,
            &room,
            &ServerMessage::WordRejected {
                reason,
                word: Some(normalized),
            },
        )
        .await;
        return;
    }

    // Accepted: stop the timer, credit the word, let the loop advance.
    let idx = room.game.current_player_index;
    room.game.deadline = None;
    room.game.turn_flag = Some(TurnFlag::WordAccepted);
    room.players[idx].words_found += 1;
    let msg = ServerMessage::WordAccepted {
        word: normalized,
        player_name: room.players[idx].name.clone(),
        player_index: idx,
        words_found: room.players[idx].words_found,
    };
    hub::broadcast_room(state, &room, &msg).await;
    room.signals.turn_over.notify_one();
}

async fn lose_life(state: &AppState, socket_id: Uuid, room_id: &str, player_id: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    if room.host_token != token {
        drop(room);
        send_error(state, socket_id, RoomError::NotHost.to_string()).await;
        return;
    }
    let Some(idx) = room.find_player(player_id) else {
        return;
    };
    force_life_loss(state, &mut room, idx).await;
}

async fn suicide_request(state: &AppState, socket_id: Uuid, room_id: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    let mut room = shared.lock().await;
    let Some(idx) = room.find_player(&token) else {
        return;
    };
    force_life_loss(state, &mut room, idx).await;
}

/// Handler-initiated life loss. When it hits the turn holder the round is
/// aborted so the loop re-arms for the seat the loss advanced to.
async fn force_life_loss(state: &AppState, room: &mut Room, idx: usize) {
    if room.phase != GamePhase::Playing {
        return;
    }
    let was_current = room.game.current_player_index == idx;
    let result = scheduler::apply_life_loss(state, room, idx).await;
    if result == scheduler::LossResult::Continued && was_current {
        room.game.paused = false;
        room.game.paused_remaining = None;
        room.game.deadline = None;
        room.game.turn_flag = Some(TurnFlag::Aborted);
        room.signals.turn_over.notify_one();
    }
}

async fn end_game(state: &AppState, socket_id: Uuid, room_id: &str) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    {
        let mut room = shared.lock().await;
        if room.host_token != token {
            drop(room);
            send_error(state, socket_id, RoomError::NotHost.to_string()).await;
            return;
        }
        if room.phase != GamePhase::Playing {
            return;
        }
        scheduler::end_game(state, &mut room).await;
    }
    hub::broadcast_rooms_list(state).await;
}

async fn update_bot_count(state: &AppState, socket_id: Uuid, room_id: &str, total_count: usize) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    {
        let mut room = shared.lock().await;
        if room.host_token != token {
            drop(room);
            send_error(state, socket_id, RoomError::NotHost.to_string()).await;
            return;
        }
        room.display_player_count = total_count.min(99);
    }
    hub::broadcast_rooms_list(state).await;
}

async fn update_settings(
    state: &AppState,
    socket_id: Uuid,
    room_id: &str,
    settings: crate::room::RoomSettings,
) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = require_room(state, socket_id, room_id).await else {
        return;
    };
    {
        let mut room = shared.lock().await;
        if room.host_token != token {
            drop(room);
            send_error(state, socket_id, RoomError::NotHost.to_string()).await;
            return;
        }
        if room.phase == GamePhase::Playing {
            drop(room);
            send_error(state, socket_id, RoomError::InProgress.to_string()).await;
            return;
        }
        room.settings = settings.sanitized();
        hub::broadcast_room(
            state,
            &room,
            &ServerMessage::SettingsUpdated {
                settings: room.settings.clone(),
            },
        )
        .await;
    }
    hub::broadcast_rooms_list(state).await;
}

// ---- social ----------------------------------------------------------------

async fn typing_update(
    state: &AppState,
    socket_id: Uuid,
    room_id: &str,
    text: String,
    player_name: String,
    accepted: bool,
) {
    let Some(token) = state.sessions.token_by_socket(socket_id).await else {
        return;
    };
    let Some(shared) = state.rooms.get(room_id).await else {
        return;
    };
    let room = shared.lock().await;
    if room.find_player(&token).is_none() {
        return;
    }
    let text: String = text.chars().take(CHAT_MAX_CHARS).collect();
    hub::broadcast_room(
        state,
        &room,
        &ServerMessage::PlayerTyping {
            player_name,
            text,
            accepted,
        },
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn chat_message(
    state: &AppState,
    socket_id: Uuid,
    room_id: &str,
    message: String,
    player_name: String,
    avatar: String,
    reply_to: Option<String>,
    staff_token: Option<String>,
    is_bot: bool,
) {
    let Some(token) = require_token(state, socket_id).await else {
        return;
    };
    let Some(shared) = state.rooms.get(room_id).await else {
        return;
    };
    let room = shared.lock().await;

    let is_staff = match staff_token {
        Some(staff_token) => state
            .stores
            .resolve_staff_token(&staff_token)
            .await
            .is_some(),
        None => false,
    };
    // Bot impersonation is a host-only trick for local bots.
    let is_bot = is_bot && room.host_token == token;

    let trimmed: String = message.chars().take(CHAT_MAX_CHARS).collect();
    let msg = ServerMessage::ChatMessage {
        player_name: html_escape::encode_text(&player_name).into_owned(),
        avatar,
        message: html_escape::encode_text(&trimmed).into_owned(),
        reply_to,
        is_staff,
        is_bot,
        timestamp: now_ms(),
    };
    hub::broadcast_room(state, &room, &msg).await;
}
