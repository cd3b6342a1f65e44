// Hub helpers for broadcasting messages to connected clients.
//
// Broadcasts serialize once and queue synchronously on every target's
// channel, so all observers of one handler see its events in emission order
// before control returns.

use crate::room::Room;
use crate::state::AppState;
use crate::ws::core::connection;
use crate::ws::messages::ServerMessage;
use uuid::Uuid;

/// Broadcast to every active connection.
pub async fn broadcast_all(state: &AppState, msg: &ServerMessage) {
    let json = msg.to_json();
    let conns = state.connections.lock().await;
    for conn in conns.values() {
        connection::send_text(conn, json.clone());
    }
}

/// Push the public room list to every connection. Never call while holding
/// a room lock (the registry listing locks rooms itself).
pub async fn broadcast_rooms_list(state: &AppState) {
    let rooms = state.rooms.list_public().await;
    broadcast_all(state, &ServerMessage::RoomsList { rooms }).await;
}

/// Broadcast to all sockets of a room: seated players plus pending
/// spectators. The caller holds the room lock, which fixes the event order
/// for every observer.
pub async fn broadcast_room(state: &AppState, room: &Room, msg: &ServerMessage) {
    let targets: Vec<Uuid> = room
        .players
        .iter()
        .chain(room.pending_spectators.iter())
        .filter_map(|p| p.socket_id)
        .collect();
    send_to_sockets(state, &targets, msg).await;
}

pub async fn send_to_sockets(state: &AppState, socket_ids: &[Uuid], msg: &ServerMessage) {
    let json = msg.to_json();
    let conns = state.connections.lock().await;
    for socket_id in socket_ids {
        if let Some(conn) = conns.get(socket_id) {
            connection::send_text(conn, json.clone());
        }
    }
}

/// Send to one socket, if still connected.
pub async fn send_to_socket(state: &AppState, socket_id: Uuid, msg: &ServerMessage) {
    let conns = state.connections.lock().await;
    if let Some(conn) = conns.get(&socket_id) {
        connection::send(conn, msg);
    }
}

/// Evict every connection from an IP with a typed `banned` event. Dropping
/// the map entry closes the outbound channel, which ends the socket task.
pub async fn evict_ip(state: &AppState, ip: &str, reason: &str) -> Vec<Uuid> {
    let mut conns = state.connections.lock().await;
    let targets: Vec<Uuid> = conns
        .values()
        .filter(|c| c.ip == ip)
        .map(|c| c.socket_id)
        .collect();
    for socket_id in &targets {
        if let Some(conn) = conns.remove(socket_id) {
            connection::send(
                &conn,
                &ServerMessage::Banned {
                    reason: reason.to_string(),
                },
            );
        }
    }
    targets
}
