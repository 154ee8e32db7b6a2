use std::collections::{HashMap, HashSet};

use wall_types::{
    MAX_HEIGHT, MAX_NAME_LEN, MIN_HEIGHT, MIN_NAME_LEN, Player, PlayerId, RoomError, RoomPhase,
    RoomSnapshot, RoundResultEntry, RoundScore,
};

use crate::scoring::{self, RoundRules};

/// What to do with a departing player, decided by the room's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureAction {
    /// Pre-game departure: erase the player from the roster.
    RemovePlayer,
    /// Mid-game or later: keep the roster entry so score and rank stay
    /// meaningful, but flag it disconnected.
    MarkDisconnected,
}

/// Where the room goes when the reveal phase ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealAdvance {
    NextRound(u32),
    GameOver,
}

/// A single game room: roster, phase, round bookkeeping and restart
/// consensus. Every externally triggerable mutation checks the current
/// phase first and rejects out-of-phase input with no state change, so
/// stale timers and out-of-order client messages cannot corrupt a room.
///
/// `Room` knows nothing about timers or transports; the scheduling layer
/// drives it through these methods and owns the deadline handles.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub players: HashMap<PlayerId, Player>,
    pub phase: RoomPhase,
    /// 0 before the game starts, then 1..=max_rounds.
    pub round: u32,
    pub max_rounds: u32,
    pub selection_seconds: u64,
    pub reveal_seconds: u64,
    /// Drawn once per round; `None` outside selection/reveal.
    pub target: Option<u8>,
    /// Only ever non-empty while the phase is game-over.
    pub restart_consents: HashSet<PlayerId>,
    pub created_at: String, // ISO 8601 string
}

impl Room {
    pub fn new(code: String, max_rounds: u32, selection_seconds: u64, reveal_seconds: u64) -> Self {
        Self {
            code,
            players: HashMap::new(),
            phase: RoomPhase::Lobby,
            round: 0,
            max_rounds,
            selection_seconds,
            reveal_seconds,
            target: None,
            restart_consents: HashSet::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, RoomError> {
        self.players.get_mut(&id).ok_or(RoomError::PlayerNotInRoom)
    }

    /// Whether new players may still enter.
    pub fn is_joinable(&self) -> bool {
        matches!(self.phase, RoomPhase::Lobby | RoomPhase::WaitingReady)
    }

    /// Add a player to the roster. The first player in becomes host.
    /// Capacity is the caller's concern.
    pub fn add_player(&mut self, id: PlayerId) -> Result<(), RoomError> {
        if !self.is_joinable() {
            return Err(RoomError::InvalidPhase);
        }
        let mut player = Player::new(id);
        player.is_host = self.players.is_empty();
        self.players.insert(id, player);
        Ok(())
    }

    /// Set a player's display name. Names lock once the player is ready.
    pub fn set_name(&mut self, id: PlayerId, name: &str) -> Result<(), RoomError> {
        let name = name.trim();
        if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
            return Err(RoomError::NameLength {
                min: MIN_NAME_LEN,
                max: MAX_NAME_LEN,
            });
        }
        let taken = self
            .players
            .values()
            .any(|p| p.id != id && p.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(RoomError::NameTaken {
                name: name.to_string(),
            });
        }

        let player = self.player_mut(id)?;
        if player.is_ready {
            return Err(RoomError::InvalidPhase);
        }
        player.name = name.to_string();
        Ok(())
    }

    /// Mark a player ready. Requires a name; the first ready moves the
    /// room from lobby to waiting-ready.
    pub fn mark_ready(&mut self, id: PlayerId) -> Result<(), RoomError> {
        if !matches!(self.phase, RoomPhase::Lobby | RoomPhase::WaitingReady) {
            return Err(RoomError::InvalidPhase);
        }
        let player = self.player_mut(id)?;
        if player.name.is_empty() {
            return Err(RoomError::NameRequired);
        }
        player.is_ready = true;
        if self.phase == RoomPhase::Lobby {
            self.phase = RoomPhase::WaitingReady;
        }
        Ok(())
    }

    /// True when every currently connected player is ready (and at least
    /// one is connected). Disconnected entries do not block game start.
    pub fn all_connected_ready(&self) -> bool {
        let mut connected = self.players.values().filter(|p| p.is_connected);
        let mut any = false;
        let all_ready = connected.all(|p| {
            any = true;
            p.is_ready
        });
        any && all_ready
    }

    /// waiting-ready → selection: round 1 begins.
    pub fn start_game(&mut self) -> Result<(), RoomError> {
        if self.phase != RoomPhase::WaitingReady {
            return Err(RoomError::InvalidPhase);
        }
        self.round = 1;
        self.clear_round_state();
        self.phase = RoomPhase::Selection;
        Ok(())
    }

    /// Record a guess during selection. Last write wins.
    pub fn record_guess(&mut self, id: PlayerId, height: u8) -> Result<(), RoomError> {
        if self.phase != RoomPhase::Selection {
            return Err(RoomError::InvalidPhase);
        }
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
            return Err(RoomError::HeightOutOfRange {
                min: MIN_HEIGHT,
                max: MAX_HEIGHT,
            });
        }
        self.player_mut(id)?.current_height = Some(height);
        Ok(())
    }

    /// True when every connected player has locked in a guess.
    pub fn all_connected_guessed(&self) -> bool {
        let mut any = false;
        let all = self
            .players
            .values()
            .filter(|p| p.is_connected)
            .all(|p| {
                any = true;
                p.current_height.is_some()
            });
        any && all
    }

    /// selection → revealing. Connected players with no guess get the
    /// default; disconnected players keep whatever they had (possibly
    /// nothing). Applies score deltas and returns the per-player results.
    pub fn close_selection(
        &mut self,
        target: u8,
        rules: &RoundRules,
    ) -> Result<Vec<RoundResultEntry>, RoomError> {
        if self.phase != RoomPhase::Selection {
            return Err(RoomError::InvalidPhase);
        }
        self.target = Some(target);

        for player in self.players.values_mut() {
            if player.is_connected && player.current_height.is_none() {
                player.current_height = Some(rules.default_height);
            }
        }

        let mut results: Vec<RoundResultEntry> = self
            .players
            .values_mut()
            .map(|player| match player.current_height {
                Some(guess) => {
                    let points = rules.score(guess, target);
                    player.score += points;
                    RoundResultEntry {
                        player_id: player.id,
                        player_name: player.name.clone(),
                        guess: Some(guess),
                        outcome: Some(scoring::outcome(guess, target)),
                        points,
                        total_score: player.score,
                    }
                }
                None => RoundResultEntry {
                    player_id: player.id,
                    player_name: player.name.clone(),
                    guess: None,
                    outcome: None,
                    points: 0,
                    total_score: player.score,
                },
            })
            .collect();
        results.sort_by(|a, b| a.player_name.cmp(&b.player_name));

        self.phase = RoomPhase::Revealing;
        Ok(results)
    }

    /// revealing → selection (next round) or game-over (last round).
    pub fn finish_reveal(&mut self) -> Result<RevealAdvance, RoomError> {
        if self.phase != RoomPhase::Revealing {
            return Err(RoomError::InvalidPhase);
        }
        if self.round < self.max_rounds {
            self.round += 1;
            self.clear_round_state();
            self.phase = RoomPhase::Selection;
            Ok(RevealAdvance::NextRound(self.round))
        } else {
            self.target = None;
            self.phase = RoomPhase::GameOver;
            Ok(RevealAdvance::GameOver)
        }
    }

    pub fn record_restart_consent(&mut self, id: PlayerId) -> Result<(), RoomError> {
        if self.phase != RoomPhase::GameOver {
            return Err(RoomError::InvalidPhase);
        }
        if !self.players.contains_key(&id) {
            return Err(RoomError::PlayerNotInRoom);
        }
        self.restart_consents.insert(id);
        Ok(())
    }

    /// True when every connected player has consented to restart.
    pub fn all_connected_consented(&self) -> bool {
        let mut any = false;
        let all = self
            .players
            .values()
            .filter(|p| p.is_connected)
            .all(|p| {
                any = true;
                self.restart_consents.contains(&p.id)
            });
        any && all
    }

    /// game-over → waiting-ready. Scores, guesses, round counter, target
    /// and consents all reset; readiness clears too, so every player must
    /// ready up again before the next match.
    pub fn reset_for_restart(&mut self) -> Result<(), RoomError> {
        if self.phase != RoomPhase::GameOver {
            return Err(RoomError::InvalidPhase);
        }
        for player in self.players.values_mut() {
            player.score = 0;
            player.current_height = None;
            player.is_ready = false;
        }
        self.round = 0;
        self.target = None;
        self.restart_consents.clear();
        self.phase = RoomPhase::WaitingReady;
        Ok(())
    }

    /// The departure policy for the current phase.
    pub fn departure_action(&self) -> DepartureAction {
        match self.phase {
            RoomPhase::Lobby | RoomPhase::WaitingReady => DepartureAction::RemovePlayer,
            _ => DepartureAction::MarkDisconnected,
        }
    }

    /// Remove a player entirely, reassigning host if needed. Returns the
    /// removed entry.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id)?;
        self.restart_consents.remove(&id);
        if removed.is_host {
            // Promotion order is not contractual; lowest id keeps it
            // deterministic.
            if let Some(next) = self.players.keys().min().copied() {
                if let Some(player) = self.players.get_mut(&next) {
                    player.is_host = true;
                }
            }
        }
        Some(removed)
    }

    pub fn mark_disconnected(&mut self, id: PlayerId) -> Result<(), RoomError> {
        self.player_mut(id)?.is_connected = false;
        Ok(())
    }

    pub fn all_disconnected(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| !p.is_connected)
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.is_connected).count()
    }

    fn clear_round_state(&mut self) {
        self.target = None;
        for player in self.players.values_mut() {
            player.current_height = None;
        }
    }

    /// Roster in a stable order for broadcasts.
    pub fn roster(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.id);
        players
    }

    pub fn round_scores(&self) -> Vec<RoundScore> {
        let mut scores: Vec<RoundScore> = self
            .players
            .values()
            .map(|p| RoundScore {
                player_id: p.id,
                player_name: p.name.clone(),
                score: p.score,
            })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.player_id.cmp(&b.player_id)));
        scores
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            phase: self.phase,
            round: self.round,
            max_rounds: self.max_rounds,
            players: self.roster(),
            created_at: self.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_room() -> Room {
        Room::new("TEST01".to_string(), 3, 30, 8)
    }

    fn join_named(room: &mut Room, name: &str) -> PlayerId {
        let id = Uuid::new_v4();
        room.add_player(id).unwrap();
        room.set_name(id, name).unwrap();
        id
    }

    fn start_two_player_game(room: &mut Room) -> (PlayerId, PlayerId) {
        let alice = join_named(room, "Alice");
        let bob = join_named(room, "Bob");
        room.mark_ready(alice).unwrap();
        room.mark_ready(bob).unwrap();
        room.start_game().unwrap();
        (alice, bob)
    }

    #[test]
    fn test_first_player_becomes_host() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");
        let bob = join_named(&mut room, "Bob");

        assert!(room.players[&alice].is_host);
        assert!(!room.players[&bob].is_host);
    }

    #[test]
    fn test_ready_requires_name() {
        let mut room = test_room();
        let id = Uuid::new_v4();
        room.add_player(id).unwrap();

        assert_eq!(room.mark_ready(id), Err(RoomError::NameRequired));
        room.set_name(id, "Alice").unwrap();
        assert!(room.mark_ready(id).is_ok());
    }

    #[test]
    fn test_first_ready_enters_waiting_ready() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");
        let _bob = join_named(&mut room, "Bob");

        assert_eq!(room.phase, RoomPhase::Lobby);
        room.mark_ready(alice).unwrap();
        assert_eq!(room.phase, RoomPhase::WaitingReady);
        assert!(!room.all_connected_ready());
    }

    #[test]
    fn test_name_locked_once_ready() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");
        room.mark_ready(alice).unwrap();

        assert_eq!(room.set_name(alice, "AliceTwo"), Err(RoomError::InvalidPhase));
        assert_eq!(room.players[&alice].name, "Alice");
    }

    #[test]
    fn test_name_conflicts_rejected_case_insensitively() {
        let mut room = test_room();
        let _alice = join_named(&mut room, "Alice");
        let bob = Uuid::new_v4();
        room.add_player(bob).unwrap();

        assert_eq!(
            room.set_name(bob, "alice"),
            Err(RoomError::NameTaken {
                name: "alice".to_string()
            })
        );
        // Renaming yourself to your own name is not a conflict.
        let alice_id = room
            .players
            .values()
            .find(|p| p.name == "Alice")
            .unwrap()
            .id;
        assert!(room.set_name(alice_id, "Alice").is_ok());
    }

    #[test]
    fn test_name_length_bounds() {
        let mut room = test_room();
        let id = Uuid::new_v4();
        room.add_player(id).unwrap();

        assert!(room.set_name(id, "A").is_err());
        assert!(room.set_name(id, &"x".repeat(21)).is_err());
        assert!(room.set_name(id, "Al").is_ok());
        assert!(room.set_name(id, &"x".repeat(20)).is_ok());
    }

    #[test]
    fn test_start_game_enters_round_one() {
        let mut room = test_room();
        let (_, _) = start_two_player_game(&mut room);

        assert_eq!(room.phase, RoomPhase::Selection);
        assert_eq!(room.round, 1);
        assert!(room.target.is_none());
    }

    #[test]
    fn test_guess_outside_selection_changes_nothing() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");

        assert_eq!(room.record_guess(alice, 5), Err(RoomError::InvalidPhase));
        assert!(room.players[&alice].current_height.is_none());
    }

    #[test]
    fn test_guess_bounds_enforced() {
        let mut room = test_room();
        let (alice, _) = start_two_player_game(&mut room);

        assert!(matches!(
            room.record_guess(alice, 0),
            Err(RoomError::HeightOutOfRange { .. })
        ));
        assert!(matches!(
            room.record_guess(alice, 11),
            Err(RoomError::HeightOutOfRange { .. })
        ));
        assert!(room.record_guess(alice, 10).is_ok());
    }

    #[test]
    fn test_last_guess_wins() {
        let mut room = test_room();
        let (alice, _) = start_two_player_game(&mut room);

        room.record_guess(alice, 3).unwrap();
        room.record_guess(alice, 8).unwrap();
        assert_eq!(room.players[&alice].current_height, Some(8));
    }

    #[test]
    fn test_close_selection_defaults_and_scores() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        room.record_guess(alice, 7).unwrap();
        // Bob never selects; the default (5) is credited.
        let results = room.close_selection(7, &rules).unwrap();

        assert_eq!(room.phase, RoomPhase::Revealing);
        assert_eq!(room.target, Some(7));

        let alice_entry = results.iter().find(|r| r.player_id == alice).unwrap();
        assert_eq!(alice_entry.outcome, Some(wall_types::GuessOutcome::Exact));
        assert_eq!(alice_entry.points, rules.exact_points);

        let bob_entry = results.iter().find(|r| r.player_id == bob).unwrap();
        assert_eq!(bob_entry.guess, Some(rules.default_height));
        assert_eq!(bob_entry.outcome, Some(wall_types::GuessOutcome::Below));
        assert_eq!(bob_entry.points, rules.below_points);
        assert_eq!(room.players[&bob].score, rules.below_points);
    }

    #[test]
    fn test_disconnected_player_is_not_defaulted() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        room.mark_disconnected(bob).unwrap();
        room.record_guess(alice, 4).unwrap();
        let results = room.close_selection(6, &rules).unwrap();

        let bob_entry = results.iter().find(|r| r.player_id == bob).unwrap();
        assert_eq!(bob_entry.guess, None);
        assert_eq!(bob_entry.outcome, None);
        assert_eq!(bob_entry.points, 0);
        assert_eq!(room.players[&bob].score, 0);
    }

    #[test]
    fn test_reveal_advances_rounds_then_ends() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        for expected_round in 1..=room.max_rounds {
            assert_eq!(room.round, expected_round);
            room.record_guess(alice, 3).unwrap();
            room.record_guess(bob, 9).unwrap();
            room.close_selection(5, &rules).unwrap();

            let advance = room.finish_reveal().unwrap();
            if expected_round < room.max_rounds {
                assert_eq!(advance, RevealAdvance::NextRound(expected_round + 1));
                assert_eq!(room.phase, RoomPhase::Selection);
                assert!(room.target.is_none());
                assert!(room.players[&alice].current_height.is_none());
            } else {
                assert_eq!(advance, RevealAdvance::GameOver);
                assert_eq!(room.phase, RoomPhase::GameOver);
            }
        }
    }

    #[test]
    fn test_stale_transition_calls_are_rejected() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        room.record_guess(alice, 3).unwrap();
        room.record_guess(bob, 9).unwrap();
        room.close_selection(5, &rules).unwrap();

        // A second close (a stale selection deadline) must be a no-op.
        assert_eq!(room.close_selection(5, &rules), Err(RoomError::InvalidPhase));

        room.finish_reveal().unwrap();
        // Likewise a stale reveal deadline after the phase moved on.
        assert_eq!(room.finish_reveal(), Err(RoomError::InvalidPhase));
    }

    #[test]
    fn test_restart_consent_only_in_game_over() {
        let mut room = test_room();
        let (alice, _) = start_two_player_game(&mut room);

        assert_eq!(
            room.record_restart_consent(alice),
            Err(RoomError::InvalidPhase)
        );
        assert!(room.restart_consents.is_empty());
    }

    #[test]
    fn test_restart_consensus_and_reset() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        for _ in 0..room.max_rounds {
            room.record_guess(alice, 2).unwrap();
            room.record_guess(bob, 8).unwrap();
            room.close_selection(5, &rules).unwrap();
            room.finish_reveal().unwrap();
        }
        assert_eq!(room.phase, RoomPhase::GameOver);
        assert_ne!(room.players[&alice].score, 0);

        room.record_restart_consent(alice).unwrap();
        assert!(!room.all_connected_consented());

        room.record_restart_consent(bob).unwrap();
        assert!(room.all_connected_consented());

        room.reset_for_restart().unwrap();
        assert_eq!(room.phase, RoomPhase::WaitingReady);
        assert_eq!(room.round, 0);
        assert!(room.restart_consents.is_empty());
        for player in room.players.values() {
            assert_eq!(player.score, 0);
            assert!(player.current_height.is_none());
            assert!(!player.is_ready);
        }
    }

    #[test]
    fn test_disconnected_player_does_not_block_consensus() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        for _ in 0..room.max_rounds {
            room.record_guess(alice, 2).unwrap();
            room.close_selection(5, &rules).unwrap();
            room.finish_reveal().unwrap();
        }
        room.mark_disconnected(bob).unwrap();

        room.record_restart_consent(alice).unwrap();
        assert!(room.all_connected_consented());
    }

    #[test]
    fn test_departure_policy_keyed_on_phase() {
        let mut room = test_room();
        let (_, _) = (join_named(&mut room, "Alice"), join_named(&mut room, "Bob"));
        assert_eq!(room.departure_action(), DepartureAction::RemovePlayer);

        room.players.values_mut().for_each(|p| p.is_ready = true);
        room.phase = RoomPhase::WaitingReady;
        assert_eq!(room.departure_action(), DepartureAction::RemovePlayer);

        room.start_game().unwrap();
        assert_eq!(room.departure_action(), DepartureAction::MarkDisconnected);

        room.phase = RoomPhase::GameOver;
        assert_eq!(room.departure_action(), DepartureAction::MarkDisconnected);
    }

    #[test]
    fn test_host_reassigned_on_host_departure() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");
        let bob = join_named(&mut room, "Bob");

        assert!(room.players[&alice].is_host);
        room.remove_player(alice);
        assert!(room.players[&bob].is_host);
    }

    #[test]
    fn test_remove_player_clears_consent() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        for _ in 0..room.max_rounds {
            room.record_guess(alice, 2).unwrap();
            room.record_guess(bob, 8).unwrap();
            room.close_selection(5, &rules).unwrap();
            room.finish_reveal().unwrap();
        }
        room.record_restart_consent(bob).unwrap();
        room.remove_player(bob);

        assert!(room.restart_consents.is_empty());
    }

    #[test]
    fn test_join_rejected_mid_game() {
        let mut room = test_room();
        let (_, _) = start_two_player_game(&mut room);

        let late = Uuid::new_v4();
        assert_eq!(room.add_player(late), Err(RoomError::InvalidPhase));
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn test_all_connected_ready_ignores_disconnected() {
        let mut room = test_room();
        let alice = join_named(&mut room, "Alice");
        let bob = join_named(&mut room, "Bob");

        room.mark_ready(alice).unwrap();
        assert!(!room.all_connected_ready());

        // Pre-game departures remove the player outright; simulate the
        // mid-game variant to check the connected-only filter.
        room.players.get_mut(&bob).unwrap().is_connected = false;
        assert!(room.all_connected_ready());
    }

    #[test]
    fn test_all_disconnected_detection() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);

        assert!(!room.all_disconnected());
        room.mark_disconnected(alice).unwrap();
        room.mark_disconnected(bob).unwrap();
        assert!(room.all_disconnected());
    }

    #[test]
    fn test_snapshot_never_contains_target() {
        let mut room = test_room();
        let (alice, bob) = start_two_player_game(&mut room);
        let rules = RoundRules::default();

        room.record_guess(alice, 3).unwrap();
        room.record_guess(bob, 9).unwrap();
        room.close_selection(5, &rules).unwrap();

        let snapshot = room.snapshot();
        assert_eq!(snapshot.phase, RoomPhase::Revealing);
        assert_eq!(snapshot.round, 1);
        // RoomSnapshot has no target field; the assertion is structural.
        assert_eq!(snapshot.players.len(), 2);
    }
}
