// Word Bomb backend

pub mod config;
pub mod dictionary;
pub mod errors;
pub mod game;
pub mod guard;
pub mod http;
mod middleware;
pub use middleware::cors_layer;
pub mod room;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;

use axum::Router;
use config::Config;
use state::AppState;
use std::net::SocketAddr;
use tokio::signal;

/// Build the full HTTP + WebSocket router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(http::create_http_routes(state.clone()))
        .merge(ws::create_ws_routes(state.clone()))
        .layer(cors_layer(&state))
        .fallback(|| async { "404 Not Found" })
}

/// Start the game server.
pub async fn start_server() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let state = AppState::new(config);

    if let Some(password) = state.config.admin_password.clone() {
        if let Err(e) = state.stores.seed_admin(&password).await {
            tracing::error!("failed to seed admin staff account: {e}");
        }
    }

    // Build the dictionary index in the background; public queries answer
    // 503 {ready:false} until the first build lands.
    {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = state
                .dictionary
                .rebuild_from(&state.config.dict_path, state.config.sample_cap)
                .await
            {
                tracing::error!("dictionary build failed: {e}");
            }
        });
    }

    spawn_maintenance(state.clone());

    let app = build_router(state.clone());
    let port = state.config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind address");

    tracing::info!("Server listening on port {}", port);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }
}

/// Fixed 60s cadence: suspicion decay and token pruning, idle-room reaping
/// (with a lobby-list push when anything was reaped), idle-session reaping.
pub fn spawn_maintenance(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            let now = chrono::Utc::now().timestamp_millis();
            state.guard.sweep(now).await;
            let reaped = state.rooms.sweep(now).await;
            if !reaped.is_empty() {
                tracing::info!("reaped {} idle rooms", reaped.len());
                ws::core::hub::broadcast_rooms_list(&state).await;
            }
            // Clear session references to rooms that no longer exist.
            for (token, room_id) in state.sessions.referenced_rooms().await {
                if state.rooms.get(&room_id).await.is_none() {
                    state.sessions.set_room(&token, None).await;
                }
            }
            state.sessions.reap(now, 3_600_000).await;
        }
    });
}

/// Handle graceful shutdown on SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, shutting down");
        },
        _ = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        },
    }
}
