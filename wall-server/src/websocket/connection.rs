use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::notifier::Notifier;
use wall_types::{PlayerId, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub player_id: Option<PlayerId>,
    pub room_code: Option<String>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = Self {
            id,
            player_id: None,
            room_code: None,
            connected_at: now,
            last_activity: now,
            sender,
        };

        (connection, receiver)
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Maps transport connections to player identities and rooms, and routes
/// outbound messages. This is the only component that knows which socket
/// belongs to which player.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Connection>,
    player_to_connection: DashMap<PlayerId, ConnectionId>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            player_to_connection: DashMap::new(),
        }
    }

    pub fn create_connection(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (conn, receiver) = Connection::new(id);
        self.connections.insert(id, conn);
        receiver
    }

    /// Drop a connection and return the player it was bound to, if any,
    /// so the caller can run disconnect handling for that player.
    pub fn remove_connection(&self, id: ConnectionId) -> Option<PlayerId> {
        let player_id = self
            .connections
            .remove(&id)
            .and_then(|(_, conn)| conn.player_id);
        if let Some(player_id) = player_id {
            self.player_to_connection.remove(&player_id);
        }
        player_id
    }

    /// Tie a connection to the player identity and room it now acts for.
    pub fn bind_player(&self, id: ConnectionId, player_id: PlayerId, room_code: &str) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.player_id = Some(player_id);
            conn.room_code = Some(room_code.to_string());
        }
        self.player_to_connection.insert(player_id, id);
    }

    pub fn player_for_connection(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&id).and_then(|conn| conn.player_id)
    }

    pub fn update_activity(&self, id: ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.last_activity = Instant::now();
        }
    }

    pub fn send_to_connection(&self, id: ConnectionId, message: ServerMessage) -> Result<(), String> {
        match self.connections.get(&id) {
            Some(conn) => conn.send_message(message),
            None => Err("Connection not found".to_string()),
        }
    }

    pub fn send_to_room(&self, code: &str, message: ServerMessage) {
        for conn in self.connections.iter() {
            if conn.room_code.as_deref() == Some(code) {
                let _ = conn.send_message(message.clone());
            }
        }
    }

    /// Drop connections that have been silent past the timeout. Returns
    /// the players that were bound to them so the room layer can treat
    /// each as a disconnect.
    pub fn cleanup_inactive_connections(&self, timeout: Duration) -> Vec<PlayerId> {
        let inactive: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|conn| conn.is_inactive(timeout))
            .map(|conn| conn.id)
            .collect();

        let mut dropped_players = Vec::new();
        for id in inactive {
            tracing::info!("Removing inactive connection: {}", id);
            if let Some(player_id) = self.remove_connection(id) {
                dropped_players.push(player_id);
            }
        }
        dropped_players
    }

    // Test helper methods
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn bound_player_count(&self) -> usize {
        self.player_to_connection.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ConnectionManager {
    async fn send_to_player(&self, player_id: PlayerId, message: ServerMessage) {
        let conn_id = self.player_to_connection.get(&player_id).map(|id| *id);
        if let Some(conn_id) = conn_id {
            let _ = self.send_to_connection(conn_id, message);
        }
    }

    async fn broadcast_to_room(&self, code: &str, message: ServerMessage) {
        self.send_to_room(code, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_creation_and_removal() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();

        let _receiver = manager.create_connection(conn_id);
        assert_eq!(manager.connection_count(), 1);

        manager.remove_connection(conn_id);
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_binding_cleanup_on_disconnect() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();
        let player_id = Uuid::new_v4();

        let _receiver = manager.create_connection(conn_id);
        manager.bind_player(conn_id, player_id, "ABC123");
        assert_eq!(manager.bound_player_count(), 1);

        let removed = manager.remove_connection(conn_id);
        assert_eq!(removed, Some(player_id));
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.bound_player_count(), 0);
    }

    #[tokio::test]
    async fn test_room_broadcast_reaches_bound_connections_only() {
        let manager = ConnectionManager::new();
        let conn1 = ConnectionId::new();
        let conn2 = ConnectionId::new();
        let conn3 = ConnectionId::new();

        let mut recv1 = manager.create_connection(conn1);
        let mut recv2 = manager.create_connection(conn2);
        let mut recv3 = manager.create_connection(conn3);

        manager.bind_player(conn1, Uuid::new_v4(), "ROOM01");
        manager.bind_player(conn2, Uuid::new_v4(), "ROOM01");
        manager.bind_player(conn3, Uuid::new_v4(), "ROOM02");

        manager.send_to_room("ROOM01", ServerMessage::SelectionLocked);

        assert!(recv1.try_recv().is_ok());
        assert!(recv2.try_recv().is_ok());
        assert!(recv3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_player_routes_through_binding() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();
        let player_id = Uuid::new_v4();

        let mut receiver = manager.create_connection(conn_id);
        manager.bind_player(conn_id, player_id, "ROOM01");

        manager
            .send_to_player(
                player_id,
                ServerMessage::RoomError {
                    message: "test".to_string(),
                },
            )
            .await;

        assert!(receiver.try_recv().is_ok());

        // Unknown players are silently dropped.
        manager
            .send_to_player(Uuid::new_v4(), ServerMessage::SelectionLocked)
            .await;
    }

    #[tokio::test]
    async fn test_message_sending_after_connection_close() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();

        let receiver = manager.create_connection(conn_id);
        drop(receiver);

        let result = manager.send_to_connection(
            conn_id,
            ServerMessage::RoomError {
                message: "test".to_string(),
            },
        );

        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), "Connection closed");
    }

    #[tokio::test]
    async fn test_inactive_cleanup_returns_bound_players() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();
        let player_id = Uuid::new_v4();

        let _receiver = manager.create_connection(conn_id);
        manager.bind_player(conn_id, player_id, "ROOM01");

        // Not inactive yet.
        let dropped = manager.cleanup_inactive_connections(Duration::from_secs(60));
        assert!(dropped.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let dropped = manager.cleanup_inactive_connections(Duration::from_millis(10));
        assert_eq!(dropped, vec![player_id]);
        assert_eq!(manager.connection_count(), 0);
    }
}
