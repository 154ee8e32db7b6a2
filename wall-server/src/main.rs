use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use wall_server::{
    config::Config,
    create_routes,
    room_manager::{RoomManager, RoomSettings},
    websocket::ConnectionManager,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting Wallgame server...");

    let config = Config::new();
    let connection_manager = Arc::new(ConnectionManager::new());

    let settings = RoomSettings {
        selection_duration: config.selection_duration(),
        reveal_duration: config.reveal_duration(),
        max_rounds: config.max_rounds,
        max_rooms: config.max_rooms,
        max_players_per_room: config.max_players_per_room,
        rules: config.round_rules(),
        ..RoomSettings::default()
    };
    let room_manager = RoomManager::new(settings, connection_manager.clone());

    let routes = create_routes(connection_manager.clone(), room_manager.clone());

    // Start cleanup task: inactive connections count as disconnects, and
    // idle or fully abandoned rooms are reaped.
    let cleanup_connection_manager = connection_manager.clone();
    let cleanup_room_manager = room_manager.clone();
    let connection_timeout = Duration::from_secs(config.connection_timeout_seconds);
    let idle_room_timeout = Duration::from_secs(config.idle_room_timeout_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;

            let dropped =
                cleanup_connection_manager.cleanup_inactive_connections(connection_timeout);
            for player_id in dropped {
                cleanup_room_manager.handle_disconnect(player_id).await;
            }

            cleanup_room_manager.reap_idle_rooms(idle_room_timeout).await;
        }
    });

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config.host.parse::<std::net::IpAddr>().unwrap(),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).unwrap();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
