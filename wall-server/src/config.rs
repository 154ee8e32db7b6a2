use std::env;
use std::time::Duration;

use wall_core::RoundRules;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub selection_seconds: u64,
    pub reveal_seconds: u64,
    pub max_rounds: u32,
    pub max_rooms: usize,
    pub max_players_per_room: usize,
    pub idle_room_timeout_seconds: u64,
    pub connection_timeout_seconds: u64,
    pub points_exact: i32,
    pub points_below: i32,
    pub points_above: i32,
    pub default_height: u8,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            selection_seconds: env::var("SELECTION_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("Invalid SELECTION_SECONDS"),
            reveal_seconds: env::var("REVEAL_SECONDS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .expect("Invalid REVEAL_SECONDS"),
            max_rounds: env::var("MAX_ROUNDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("Invalid MAX_ROUNDS"),
            max_rooms: env::var("MAX_ROOMS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("Invalid MAX_ROOMS"),
            max_players_per_room: env::var("MAX_PLAYERS_PER_ROOM")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .expect("Invalid MAX_PLAYERS_PER_ROOM"),
            idle_room_timeout_seconds: env::var("IDLE_ROOM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .expect("Invalid IDLE_ROOM_TIMEOUT_SECONDS"),
            connection_timeout_seconds: env::var("CONNECTION_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("Invalid CONNECTION_TIMEOUT_SECONDS"),
            points_exact: env::var("POINTS_EXACT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("Invalid POINTS_EXACT"),
            points_below: env::var("POINTS_BELOW")
                .unwrap_or_else(|_| "-2".to_string())
                .parse()
                .expect("Invalid POINTS_BELOW"),
            points_above: env::var("POINTS_ABOVE")
                .unwrap_or_else(|_| "-5".to_string())
                .parse()
                .expect("Invalid POINTS_ABOVE"),
            default_height: env::var("DEFAULT_HEIGHT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("Invalid DEFAULT_HEIGHT"),
        }
    }

    pub fn round_rules(&self) -> RoundRules {
        RoundRules {
            exact_points: self.points_exact,
            below_points: self.points_below,
            above_points: self.points_above,
            default_height: self.default_height,
        }
        .validated()
    }

    pub fn selection_duration(&self) -> Duration {
        Duration::from_secs(self.selection_seconds)
    }

    pub fn reveal_duration(&self) -> Duration {
        Duration::from_secs(self.reveal_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
