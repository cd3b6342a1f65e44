// Per-connection send helpers.
use crate::state::ConnectionInfo;
use crate::ws::messages::ServerMessage;
use std::sync::Arc;

/// Queue a typed server message on the connection's outbound channel. The
/// socket task drains the channel; a closed channel means the peer is gone
/// and the message is dropped silently.
pub fn send(conn: &Arc<ConnectionInfo>, msg: &ServerMessage) {
    let _ = conn.sender.send(msg.to_json());
}

/// Queue raw text (pre-serialized broadcasts).
pub fn send_text(conn: &Arc<ConnectionInfo>, text: String) {
    let _ = conn.sender.send(text);
}
