pub mod actions;
pub mod websocket;

pub use websocket::{handle_disconnect, ws_handler};
