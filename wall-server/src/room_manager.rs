use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use wall_core::{
    DepartureAction, RevealAdvance, Room, RoundRules, compute_final_scores, generate_unique_code,
};
use wall_types::{
    MAX_HEIGHT, MIN_HEIGHT, PlayerId, RoomError, RoomPhase, RoomSnapshot, ServerMessage,
};

use crate::notifier::Notifier;

/// Tunables for room creation and round pacing.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub selection_duration: Duration,
    pub reveal_duration: Duration,
    pub max_rounds: u32,
    pub max_rooms: usize,
    pub max_players_per_room: usize,
    pub rules: RoundRules,
    /// Inclusive range targets are drawn from. Tests pin both ends to the
    /// same value to make reveals deterministic.
    pub target_min: u8,
    pub target_max: u8,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            selection_duration: Duration::from_secs(30),
            reveal_duration: Duration::from_secs(8),
            max_rounds: 10,
            max_rooms: 100,
            max_players_per_room: 8,
            rules: RoundRules::default(),
            target_min: MIN_HEIGHT,
            target_max: MAX_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    Selection,
    Reveal,
}

/// The armed deadline of a room. At most one exists per room at any time;
/// arming a new one always cancels the previous one first. The generation
/// number is checked again when a deadline fires, so a firing that lost
/// the race against cancellation is a no-op.
struct ArmedDeadline {
    kind: DeadlineKind,
    generation: u64,
    abort: AbortHandle,
}

struct ActiveRoom {
    room: Room,
    deadline: Option<ArmedDeadline>,
    next_generation: u64,
    last_activity: Instant,
}

impl ActiveRoom {
    fn new(room: Room) -> Self {
        Self {
            room,
            deadline: None,
            next_generation: 0,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn cancel_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort.abort();
        }
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Owns every room and serializes all per-room mutations: player actions
/// and deadline firings for one room both run under the same write lock,
/// for the full duration of the transition they trigger. Rooms share no
/// state with each other beyond these top-level maps.
pub struct RoomManager {
    me: Weak<RoomManager>,
    rooms: RwLock<HashMap<String, ActiveRoom>>,
    player_to_room: RwLock<HashMap<PlayerId, String>>,
    notifier: Arc<dyn Notifier>,
    settings: RoomSettings,
}

impl RoomManager {
    pub fn new(settings: RoomSettings, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            rooms: RwLock::new(HashMap::new()),
            player_to_room: RwLock::new(HashMap::new()),
            notifier,
            settings,
        })
    }

    /// Create a room with `host` as its first player and return its code.
    pub async fn create_room(&self, host: PlayerId) -> Result<String, RoomError> {
        let code = {
            let mut rooms = self.rooms.write().await;
            if rooms.len() >= self.settings.max_rooms {
                return Err(RoomError::TooManyRooms);
            }
            let code = generate_unique_code(|candidate| rooms.contains_key(candidate))?;
            let mut room = Room::new(
                code.clone(),
                self.settings.max_rounds,
                self.settings.selection_duration.as_secs(),
                self.settings.reveal_duration.as_secs(),
            );
            room.add_player(host)?;
            rooms.insert(code.clone(), ActiveRoom::new(room));
            code
        };

        self.player_to_room
            .write()
            .await
            .insert(host, code.clone());

        info!("Created room {} for player {}", code, host);
        Ok(code)
    }

    /// Add a player to an existing room. Rejected once the game has
    /// started, and when the room is at capacity.
    pub async fn join_room(
        &self,
        code: &str,
        player: PlayerId,
    ) -> Result<RoomSnapshot, RoomError> {
        let snapshot = {
            let mut rooms = self.rooms.write().await;
            let entry = rooms.get_mut(code).ok_or_else(|| RoomError::RoomNotFound {
                code: code.to_string(),
            })?;
            if !entry.room.is_joinable() {
                return Err(RoomError::InvalidPhase);
            }
            if entry.room.players.len() >= self.settings.max_players_per_room {
                return Err(RoomError::RoomFull);
            }
            entry.room.add_player(player)?;
            entry.touch();
            entry.room.snapshot()
        };

        self.player_to_room
            .write()
            .await
            .insert(player, code.to_string());

        info!("Player {} joined room {}", player, code);
        Ok(snapshot)
    }

    /// Broadcast the current roster to a room. Callers use this after
    /// binding a fresh connection so the new player sees it too.
    pub async fn broadcast_roster(&self, code: &str) {
        let players = {
            let rooms = self.rooms.read().await;
            match rooms.get(code) {
                Some(entry) => entry.room.roster(),
                None => return,
            }
        };
        self.notifier
            .broadcast_to_room(code, ServerMessage::PlayerListUpdated { players })
            .await;
    }

    pub async fn set_name(&self, player: PlayerId, name: &str) -> Result<(), RoomError> {
        let code = self.room_code_for(player).await?;
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&code).ok_or(RoomError::PlayerNotInRoom)?;
        entry.room.set_name(player, name)?;
        entry.touch();
        let players = entry.room.roster();
        drop(rooms);
        self.notifier
            .broadcast_to_room(&code, ServerMessage::PlayerListUpdated { players })
            .await;
        Ok(())
    }

    /// Mark a player ready. When every connected player is ready the game
    /// starts immediately, with no further external trigger.
    pub async fn mark_ready(&self, player: PlayerId) -> Result<(), RoomError> {
        let code = self.room_code_for(player).await?;
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&code).ok_or(RoomError::PlayerNotInRoom)?;
        entry.room.mark_ready(player)?;
        entry.touch();
        self.notifier
            .broadcast_to_room(
                &code,
                ServerMessage::PlayerListUpdated {
                    players: entry.room.roster(),
                },
            )
            .await;
        if entry.room.all_connected_ready() {
            self.begin_game(entry, &code).await?;
        }
        Ok(())
    }

    /// Record a guess. If this was the last connected player to pick, the
    /// selection closes early and the armed deadline is cancelled.
    pub async fn submit_guess(&self, player: PlayerId, height: u8) -> Result<(), RoomError> {
        let code = self.room_code_for(player).await?;
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&code).ok_or(RoomError::PlayerNotInRoom)?;
        entry.room.record_guess(player, height)?;
        entry.touch();
        if entry.room.all_connected_guessed() {
            self.close_selection(entry, &code).await?;
        }
        Ok(())
    }

    pub async fn give_restart_consent(&self, player: PlayerId) -> Result<(), RoomError> {
        let code = self.room_code_for(player).await?;
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&code).ok_or(RoomError::PlayerNotInRoom)?;
        entry.room.record_restart_consent(player)?;
        entry.touch();
        self.notifier
            .broadcast_to_room(
                &code,
                ServerMessage::RestartStatus {
                    consents: entry.room.restart_consents.len(),
                    total: entry.room.connected_count(),
                },
            )
            .await;
        if entry.room.all_connected_consented() {
            self.restart_room(entry, &code).await?;
        }
        Ok(())
    }

    /// Handle the transport telling us a player's connection is gone.
    /// Pre-game the player is removed outright; mid-game it is retained
    /// and marked disconnected. Either way the departure may unblock a
    /// pending transition, which is re-checked here.
    pub async fn handle_disconnect(&self, player: PlayerId) {
        let Some(code) = self.player_to_room.read().await.get(&player).cloned() else {
            return;
        };

        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(&code) else {
            self.player_to_room.write().await.remove(&player);
            return;
        };

        match entry.room.departure_action() {
            DepartureAction::RemovePlayer => {
                let Some(removed) = entry.room.remove_player(player) else {
                    return;
                };
                info!("Player {} left room {} pre-game", player, code);
                self.notifier
                    .broadcast_to_room(
                        &code,
                        ServerMessage::PlayerLeft {
                            player_id: removed.id,
                            player_name: removed.name.clone(),
                        },
                    )
                    .await;

                if entry.room.players.is_empty() {
                    Self::remove_room_entry(&mut rooms, &code);
                } else {
                    self.notifier
                        .broadcast_to_room(
                            &code,
                            ServerMessage::PlayerListUpdated {
                                players: entry.room.roster(),
                            },
                        )
                        .await;
                    // The departed player may have been the last one not
                    // ready.
                    if entry.room.phase == RoomPhase::WaitingReady
                        && entry.room.all_connected_ready()
                    {
                        let _ = self.begin_game(entry, &code).await;
                    }
                }
                drop(rooms);
                self.player_to_room.write().await.remove(&player);
            }
            DepartureAction::MarkDisconnected => {
                if entry.room.mark_disconnected(player).is_err() {
                    return;
                }
                info!("Player {} disconnected from room {}", player, code);
                self.notifier
                    .broadcast_to_room(&code, ServerMessage::PlayerDisconnected { player_id: player })
                    .await;

                if entry.room.all_disconnected() {
                    // Nobody left to play; drop the whole room.
                    let removed_players = Self::remove_room_entry(&mut rooms, &code);
                    drop(rooms);
                    let mut reverse = self.player_to_room.write().await;
                    for id in removed_players {
                        reverse.remove(&id);
                    }
                    return;
                }

                self.notifier
                    .broadcast_to_room(
                        &code,
                        ServerMessage::PlayerListUpdated {
                            players: entry.room.roster(),
                        },
                    )
                    .await;

                // The departed player may have been the last holdout of
                // the current phase.
                if entry.room.phase == RoomPhase::Selection && entry.room.all_connected_guessed() {
                    let _ = self.close_selection(entry, &code).await;
                } else if entry.room.phase == RoomPhase::GameOver
                    && entry.room.all_connected_consented()
                {
                    let _ = self.restart_room(entry, &code).await;
                }
            }
        }
    }

    /// Destroy a room, releasing any armed deadline. Idempotent.
    pub async fn delete_room(&self, code: &str) {
        let removed_players = {
            let mut rooms = self.rooms.write().await;
            Self::remove_room_entry(&mut rooms, code)
        };
        if !removed_players.is_empty() {
            let mut reverse = self.player_to_room.write().await;
            for id in removed_players {
                reverse.remove(&id);
            }
        }
    }

    /// Destroy rooms that have been idle past the timeout or whose entire
    /// roster is disconnected.
    pub async fn reap_idle_rooms(&self, idle_timeout: Duration) {
        let stale: Vec<String> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(_, entry)| {
                    entry.is_idle(idle_timeout) || entry.room.all_disconnected()
                })
                .map(|(code, _)| code.clone())
                .collect()
        };

        for code in stale {
            info!("Reaping idle room {}", code);
            self.delete_room(&code).await;
        }
    }

    pub async fn get_snapshot(&self, code: &str) -> Option<RoomSnapshot> {
        let rooms = self.rooms.read().await;
        rooms.get(code).map(|entry| entry.room.snapshot())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    // ---- transitions ----

    /// waiting-ready → selection (round 1). Caller has verified readiness.
    async fn begin_game(&self, entry: &mut ActiveRoom, code: &str) -> Result<(), RoomError> {
        entry.room.start_game()?;
        info!("Room {} started with {} players", code, entry.room.players.len());
        self.notifier
            .broadcast_to_room(
                code,
                ServerMessage::GameStarted {
                    max_rounds: entry.room.max_rounds,
                },
            )
            .await;
        self.broadcast_round_started(entry, code).await;
        self.arm_deadline(entry, DeadlineKind::Selection, self.settings.selection_duration);
        Ok(())
    }

    /// selection → revealing: lock selections, draw the wall, score the
    /// round, arm the reveal deadline. Reached from the selection deadline
    /// or from the last connected player guessing early.
    async fn close_selection(&self, entry: &mut ActiveRoom, code: &str) -> Result<(), RoomError> {
        entry.cancel_deadline();
        let target = self.draw_target();
        let results = entry.room.close_selection(target, &self.settings.rules)?;
        entry.touch();

        self.notifier
            .broadcast_to_room(code, ServerMessage::SelectionLocked)
            .await;
        self.notifier
            .broadcast_to_room(code, ServerMessage::WallRevealed { target, results })
            .await;
        self.notifier
            .broadcast_to_room(
                code,
                ServerMessage::RoundEnded {
                    scores: entry.room.round_scores(),
                },
            )
            .await;

        self.arm_deadline(entry, DeadlineKind::Reveal, self.settings.reveal_duration);
        Ok(())
    }

    /// revealing → next selection round, or game-over after the last one.
    async fn finish_reveal(&self, entry: &mut ActiveRoom, code: &str) -> Result<(), RoomError> {
        entry.cancel_deadline();
        match entry.room.finish_reveal()? {
            RevealAdvance::NextRound(_) => {
                entry.touch();
                self.broadcast_round_started(entry, code).await;
                self.arm_deadline(
                    entry,
                    DeadlineKind::Selection,
                    self.settings.selection_duration,
                );
            }
            RevealAdvance::GameOver => {
                entry.touch();
                info!("Room {} finished after {} rounds", code, entry.room.round);
                let final_scores = compute_final_scores(&entry.room.roster());
                self.notifier
                    .broadcast_to_room(code, ServerMessage::GameEnded { final_scores })
                    .await;
            }
        }
        Ok(())
    }

    /// game-over → waiting-ready once every connected player consented.
    async fn restart_room(&self, entry: &mut ActiveRoom, code: &str) -> Result<(), RoomError> {
        entry.room.reset_for_restart()?;
        entry.cancel_deadline();
        entry.touch();
        info!("Room {} restarting by consensus", code);
        self.notifier
            .broadcast_to_room(
                code,
                ServerMessage::PlayerListUpdated {
                    players: entry.room.roster(),
                },
            )
            .await;
        Ok(())
    }

    async fn broadcast_round_started(&self, entry: &ActiveRoom, code: &str) {
        self.notifier
            .broadcast_to_room(
                code,
                ServerMessage::RoundStarted {
                    round_number: entry.room.round,
                    duration_seconds: self.settings.selection_duration.as_secs(),
                },
            )
            .await;
    }

    // ---- deadline plumbing ----

    /// Arm a single-shot deadline for this room, cancelling whatever was
    /// armed before. The spawned task re-enters the manager through the
    /// same write lock every player action takes, carrying the generation
    /// it was armed with.
    fn arm_deadline(&self, entry: &mut ActiveRoom, kind: DeadlineKind, duration: Duration) {
        entry.cancel_deadline();
        let generation = entry.next_generation;
        entry.next_generation += 1;

        let Some(manager) = self.me.upgrade() else {
            return;
        };
        let code = entry.room.code.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            match kind {
                DeadlineKind::Selection => manager.on_selection_deadline(&code, generation).await,
                DeadlineKind::Reveal => manager.on_reveal_deadline(&code, generation).await,
            }
        });

        entry.deadline = Some(ArmedDeadline {
            kind,
            generation,
            abort: handle.abort_handle(),
        });
    }

    async fn on_selection_deadline(&self, code: &str, generation: u64) {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(code) else {
            return;
        };
        if !Self::deadline_is_current(entry, DeadlineKind::Selection, generation) {
            return;
        }
        if let Err(e) = self.close_selection(entry, code).await {
            warn!("Selection deadline for room {} hit a stale phase: {}", code, e);
        }
    }

    async fn on_reveal_deadline(&self, code: &str, generation: u64) {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(code) else {
            return;
        };
        if !Self::deadline_is_current(entry, DeadlineKind::Reveal, generation) {
            return;
        }
        if let Err(e) = self.finish_reveal(entry, code).await {
            warn!("Reveal deadline for room {} hit a stale phase: {}", code, e);
        }
    }

    /// A deadline firing is only honored if it is still the one armed on
    /// the room. Cancellation aborts the task, but an in-flight firing
    /// that already passed its sleep loses here instead.
    fn deadline_is_current(entry: &ActiveRoom, kind: DeadlineKind, generation: u64) -> bool {
        entry
            .deadline
            .as_ref()
            .is_some_and(|d| d.kind == kind && d.generation == generation)
    }

    // ---- helpers ----

    async fn room_code_for(&self, player: PlayerId) -> Result<String, RoomError> {
        self.player_to_room
            .read()
            .await
            .get(&player)
            .cloned()
            .ok_or(RoomError::PlayerNotInRoom)
    }

    fn draw_target(&self) -> u8 {
        rand::rng().random_range(self.settings.target_min..=self.settings.target_max)
    }

    /// Remove a room from the map, cancel its deadline and return the ids
    /// whose reverse mapping should be cleaned up.
    fn remove_room_entry(
        rooms: &mut HashMap<String, ActiveRoom>,
        code: &str,
    ) -> Vec<PlayerId> {
        match rooms.remove(code) {
            Some(mut entry) => {
                entry.cancel_deadline();
                info!("Removed room {}", code);
                entry.room.players.keys().copied().collect()
            }
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    async fn armed_deadline(&self, code: &str) -> Option<(bool, u64)> {
        let rooms = self.rooms.read().await;
        rooms.get(code).and_then(|entry| {
            entry
                .deadline
                .as_ref()
                .map(|d| (d.kind == DeadlineKind::Selection, d.generation))
        })
    }
}
