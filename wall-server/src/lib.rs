use std::sync::Arc;
use warp::Filter;

use crate::room_manager::RoomManager;
use crate::websocket::ConnectionManager;

pub mod config;
pub mod notifier;
pub mod room_manager;
pub mod websocket;

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    room_manager: Arc<RoomManager>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // Clone for filters
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let room_manager_filter = warp::any().map({
        let room_manager = room_manager.clone();
        move || room_manager.clone()
    });

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter.clone())
        .and(room_manager_filter.clone())
        .map(|ws: warp::ws::Ws, conn_mgr, room_mgr| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, conn_mgr, room_mgr))
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    // Read-only room snapshot, safe to poll while reconnecting. Never
    // includes the current target.
    let room_state = warp::path!("room" / String / "state")
        .and(warp::get())
        .and(room_manager_filter.clone())
        .and_then(handle_room_state_request);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET"]);

    websocket
        .or(health)
        .or(room_state)
        .with(cors)
        .with(warp::log("wallgame"))
}

async fn handle_room_state_request(
    code: String,
    room_manager: Arc<RoomManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match room_manager.get_snapshot(&code).await {
        Some(snapshot) => Ok(warp::reply::with_status(
            warp::reply::json(&snapshot),
            warp::http::StatusCode::OK,
        )),
        None => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": "Room not found"
            })),
            warp::http::StatusCode::NOT_FOUND,
        )),
    }
}
