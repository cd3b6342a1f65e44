pub mod core;
pub mod handler;
pub mod messages;
pub mod routes;

pub use routes::create_ws_routes;
