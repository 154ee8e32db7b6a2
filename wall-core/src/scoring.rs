use tracing::warn;
use wall_types::{FinalScore, GuessOutcome, MAX_HEIGHT, MIN_HEIGHT, Player};

/// Scoring and default-selection constants for a round. All values come
/// from configuration; the expected ordering is
/// `exact_points > 0 > below_points > above_points`.
#[derive(Debug, Clone)]
pub struct RoundRules {
    pub exact_points: i32,
    pub below_points: i32,
    pub above_points: i32,
    /// Height credited to a connected player who never selects one
    /// before the deadline.
    pub default_height: u8,
}

impl Default for RoundRules {
    fn default() -> Self {
        Self {
            exact_points: 10,
            below_points: -2,
            above_points: -5,
            default_height: 5,
        }
    }
}

impl RoundRules {
    /// Sanity-check the configured constants, warning on anything that
    /// breaks the reward/penalty ordering contract. Values are not
    /// altered; an operator who configures an inverted table gets the
    /// table they asked for, plus a log line.
    pub fn validated(self) -> Self {
        if self.exact_points <= 0
            || self.below_points >= 0
            || self.above_points >= 0
            || self.above_points >= self.below_points
        {
            warn!(
                exact = self.exact_points,
                below = self.below_points,
                above = self.above_points,
                "scoring constants do not satisfy exact > 0 > below > above"
            );
        }
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&self.default_height) {
            warn!(
                default_height = self.default_height,
                "default height is outside the selectable range"
            );
        }
        self
    }

    /// Points earned for a guess against the revealed target.
    pub fn score(&self, guess: u8, target: u8) -> i32 {
        match outcome(guess, target) {
            GuessOutcome::Exact => self.exact_points,
            GuessOutcome::Below => self.below_points,
            GuessOutcome::Above => self.above_points,
        }
    }
}

/// Categorize a guess relative to the target. Agrees with
/// [`RoundRules::score`] by construction: both key off this comparison.
pub fn outcome(guess: u8, target: u8) -> GuessOutcome {
    use std::cmp::Ordering;
    match guess.cmp(&target) {
        Ordering::Equal => GuessOutcome::Exact,
        Ordering::Less => GuessOutcome::Below,
        Ordering::Greater => GuessOutcome::Above,
    }
}

/// Rank every player by total score, descending. Ranks are the 1-based
/// position in that order — tied scores still get distinct, sequential
/// ranks. `is_winner` is true for everyone whose score equals the room
/// maximum, so a tie at the top produces several winners.
pub fn compute_final_scores(players: &[Player]) -> Vec<FinalScore> {
    let mut ranked: Vec<&Player> = players.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    let top_score = ranked.first().map(|p| p.score);
    ranked
        .iter()
        .enumerate()
        .map(|(i, p)| FinalScore {
            player_id: p.id,
            player_name: p.name.clone(),
            score: p.score,
            rank: (i + 1) as u32,
            is_winner: Some(p.score) == top_score,
        })
        .collect()
}
