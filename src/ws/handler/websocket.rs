// Game websocket: upgrade, connection lifecycle, staged disconnect.
//
// Outbound traffic flows through the connection's channel so broadcasts are
// queued in order without waiting on the peer; this loop drains the channel
// into the sink and reads inbound frames. A closed channel means the server
// evicted the connection (ban).

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade, ws::Message},
    http::StatusCode,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use uuid::Uuid;

use crate::game::scheduler;
use crate::room::GamePhase;
use crate::state::{AppState, ConnectionInfo};
use crate::ws::core::{connection, hub};
use crate::ws::handler::actions;
use crate::ws::messages::{ClientMessage, ServerMessage};

/// Grace before a silent socket loss marks the player disconnected.
const DISCONNECT_MARK_DELAY: Duration = Duration::from_secs(8);
/// Further grace before the player is evicted from their room.
const DISCONNECT_EVICT_DELAY: Duration = Duration::from_secs(45);

/// HTTP endpoint: upgrade to the game socket. Banned and guard-blocked IPs
/// are rejected before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();
    if state.stores.is_banned(&ip).await || state.guard.is_blocked(&ip).await {
        tracing::warn!("refused socket upgrade from banned ip {ip}");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, ip, state))
        .into_response()
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, ip: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let socket_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = Arc::new(ConnectionInfo {
        socket_id,
        ip: ip.clone(),
        sender: tx,
    });
    state.connections.lock().await.insert(socket_id, conn.clone());
    tracing::debug!("socket {socket_id} connected from {ip}");

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // Channel dropped server-side: eviction.
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => actions::dispatch(&state, socket_id, &ip, msg).await,
                        Err(e) => {
                            tracing::debug!("unparseable client message: {e}");
                            connection::send(
                                &conn,
                                &ServerMessage::Error {
                                    message: "message invalide".into(),
                                },
                            );
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("ws recv err: {e}");
                    break;
                }
            }
        }
    }

    state.connections.lock().await.remove(&socket_id);
    handle_disconnect(&state, socket_id).await;
}

/// Transport loss: nothing is broadcast yet. The session keeps living for
/// grace-period lookups and a staged eviction starts against the session's
/// disconnect generation.
pub async fn handle_disconnect(state: &AppState, socket_id: Uuid) {
    let now = chrono::Utc::now().timestamp_millis();
    let Some((token, generation)) = state.sessions.unregister(socket_id, now).await else {
        return;
    };
    tracing::debug!("socket {socket_id} lost, session enters grace window");
    tokio::spawn(staged_eviction(state.clone(), token, generation));
}

/// True while the captured generation is still the session's live one and
/// no new socket took over. Any reconnection voids the pending stages.
async fn still_disconnected(state: &AppState, token: &str, generation: u64) -> bool {
    match state.sessions.get(token).await {
        Some(session) => {
            session.socket_id.is_none() && session.disconnect_gen == generation
        }
        None => false,
    }
}

/// Stage 2 (t+8s): mark the player disconnected, pausing the round when
/// they held the turn. Stage 3 (t+53s): evict them from the room.
async fn staged_eviction(state: AppState, token: String, generation: u64) {
    sleep(DISCONNECT_MARK_DELAY).await;
    if !still_disconnected(&state, &token, generation).await {
        return;
    }

    let Some(room_id) = state.sessions.get(&token).await.and_then(|s| s.room_id) else {
        return;
    };
    if let Some(shared) = state.rooms.get(&room_id).await {
        let mut room = shared.lock().await;
        if let Some(idx) = room.find_player(&token) {
            room.players[idx].disconnected = true;
            room.players[idx].socket_id = None;
            let player_name = room.players[idx].name.clone();
            let holds_turn = room.phase == GamePhase::Playing
                && room.game.current_player_index == idx
                && !room.game.paused;
            if holds_turn {
                scheduler::pause_round(&state, &mut room, "playerDisconnected").await;
            }
            hub::broadcast_room(
                &state,
                &room,
                &ServerMessage::PlayerDisconnected {
                    player_name,
                    game_paused: holds_turn,
                },
            )
            .await;
        }
    }

    sleep(DISCONNECT_EVICT_DELAY).await;
    if !still_disconnected(&state, &token, generation).await {
        return;
    }

    tracing::info!("evicting abandoned session from room {room_id}");
    actions::remove_from_room(&state, &room_id, &token).await;
}
