use std::env;

use rampart_core::{encoder::MAX_FRAME_LEN, Key, SessionConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Shared secret clients append to their path for privilege.
    pub secret: Option<String>,
    pub max_clients: usize,
    /// Turn length in clock units; 0 means unlimited turns.
    pub turn_duration: i64,
    /// Idle clock units before the checkpoint fires.
    pub idle_grace: i64,
    pub idle_checkpoint: bool,
    /// "game" counts ticks instead of wall seconds.
    pub use_game_clock: bool,
    pub tick_ms: u64,
    pub unpause_key: Key,
    /// Demo grid dimensions.
    pub grid_width: u8,
    pub grid_height: u8,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("RAMPART_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(8080),
            secret: env::var("RAMPART_SECRET").ok().filter(|s| !s.is_empty()),
            max_clients: env::var("RAMPART_MAX_CLIENTS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(32),
            turn_duration: env::var("RAMPART_TURN_SECONDS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(300),
            idle_grace: env::var("RAMPART_IDLE_GRACE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(10),
            idle_checkpoint: env::var("RAMPART_IDLE_CHECKPOINT")
                .map(|value| matches_truthy(&value))
                .unwrap_or(true),
            use_game_clock: env::var("RAMPART_CLOCK")
                .map(|value| value.eq_ignore_ascii_case("game"))
                .unwrap_or(false),
            tick_ms: env::var("RAMPART_TICK_MS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(100),
            unpause_key: env::var("RAMPART_UNPAUSE_KEY")
                .map(|value| parse_unpause_key(&value))
                .unwrap_or(Key::Space),
            grid_width: env::var("RAMPART_GRID_WIDTH")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(80),
            grid_height: env::var("RAMPART_GRID_HEIGHT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(25),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_clients: self.max_clients,
            turn_duration: self.turn_duration,
            idle_grace: self.idle_grace,
            idle_checkpoint: self.idle_checkpoint,
            use_game_clock: self.use_game_clock,
            max_frame_len: MAX_FRAME_LEN,
            unpause_key: self.unpause_key,
            secret: self.secret.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            secret: None,
            max_clients: 32,
            turn_duration: 300,
            idle_grace: 10,
            idle_checkpoint: true,
            use_game_clock: false,
            tick_ms: 100,
            unpause_key: Key::Space,
            grid_width: 80,
            grid_height: 25,
        }
    }
}

fn matches_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_unpause_key(value: &str) -> Key {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "space" => Key::Space,
        "enter" => Key::Enter,
        single if single.len() == 1 => Key::Char(single.as_bytes()[0]),
        _ => Key::Space,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpause_key_parsing() {
        assert_eq!(parse_unpause_key("space"), Key::Space);
        assert_eq!(parse_unpause_key("Enter"), Key::Enter);
        assert_eq!(parse_unpause_key("."), Key::Char(b'.'));
        assert_eq!(parse_unpause_key("bogus"), Key::Space);
    }

    #[test]
    fn truthy_values() {
        assert!(matches_truthy("1"));
        assert!(matches_truthy(" TRUE "));
        assert!(!matches_truthy("0"));
        assert!(!matches_truthy("off"));
    }
}
