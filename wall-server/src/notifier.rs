use async_trait::async_trait;
use wall_types::{PlayerId, ServerMessage};

/// Outbound side of the transport, as seen by the room manager. The
/// production implementation lives on `ConnectionManager`; tests inject a
/// recording double.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to one player's current connection, if any.
    async fn send_to_player(&self, player_id: PlayerId, message: ServerMessage);

    /// Deliver a message to every connection currently bound to a room.
    async fn broadcast_to_room(&self, code: &str, message: ServerMessage);
}
