use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::room_manager::RoomManager;
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use wall_types::{ClientMessage, PlayerId, RoomError, ServerMessage};

/// Routes one connection's inbound actions into the room manager and
/// reports failures back to that connection only.
#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    room_manager: Arc<RoomManager>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        room_manager: Arc<RoomManager>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            room_manager,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) {
        // Any inbound traffic counts as activity.
        self.connection_manager.update_activity(self.connection_id);

        let result = match message {
            ClientMessage::CreateRoom => self.handle_create_room().await,
            ClientMessage::JoinRoom { code } => self.handle_join_room(&code).await,
            ClientMessage::SetName { name } => match self.bound_player() {
                Ok(player) => self.room_manager.set_name(player, &name).await,
                Err(e) => Err(e),
            },
            ClientMessage::MarkReady => match self.bound_player() {
                Ok(player) => self.room_manager.mark_ready(player).await,
                Err(e) => Err(e),
            },
            ClientMessage::SubmitGuess { height } => match self.bound_player() {
                Ok(player) => self.room_manager.submit_guess(player, height).await,
                Err(e) => Err(e),
            },
            ClientMessage::GiveRestartConsent => match self.bound_player() {
                Ok(player) => self.room_manager.give_restart_consent(player).await,
                Err(e) => Err(e),
            },
            ClientMessage::Heartbeat => Ok(()),
        };

        if let Err(error) = result {
            self.send_error(&error);
        }
    }

    /// Connection went away. Unbind it and let the room layer apply the
    /// phase-dependent departure policy.
    pub async fn handle_disconnect(&self) {
        info!("Handling disconnect for connection {}", self.connection_id);
        if let Some(player_id) = self.connection_manager.remove_connection(self.connection_id) {
            self.room_manager.handle_disconnect(player_id).await;
        }
    }

    async fn handle_create_room(&self) -> Result<(), RoomError> {
        if self
            .connection_manager
            .player_for_connection(self.connection_id)
            .is_some()
        {
            return Err(RoomError::AlreadyInRoom);
        }

        let player_id = Uuid::new_v4();
        let code = self.room_manager.create_room(player_id).await?;
        self.connection_manager
            .bind_player(self.connection_id, player_id, &code);

        let _ = self.connection_manager.send_to_connection(
            self.connection_id,
            ServerMessage::RoomCreated {
                code: code.clone(),
                player_id,
            },
        );
        self.room_manager.broadcast_roster(&code).await;
        Ok(())
    }

    async fn handle_join_room(&self, code: &str) -> Result<(), RoomError> {
        if self
            .connection_manager
            .player_for_connection(self.connection_id)
            .is_some()
        {
            return Err(RoomError::AlreadyInRoom);
        }

        let player_id = Uuid::new_v4();
        let room = self.room_manager.join_room(code, player_id).await?;
        self.connection_manager
            .bind_player(self.connection_id, player_id, code);

        let _ = self
            .connection_manager
            .send_to_connection(self.connection_id, ServerMessage::RoomJoined { room });
        self.room_manager.broadcast_roster(code).await;
        Ok(())
    }

    fn bound_player(&self) -> Result<PlayerId, RoomError> {
        self.connection_manager
            .player_for_connection(self.connection_id)
            .ok_or(RoomError::PlayerNotInRoom)
    }

    fn send_error(&self, error: &RoomError) {
        let _ = self.connection_manager.send_to_connection(
            self.connection_id,
            ServerMessage::RoomError {
                message: error.to_string(),
            },
        );
    }
}
