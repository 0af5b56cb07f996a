use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for turn and idle arithmetic. A session picks one clock at
/// startup and sticks with it: either wall-clock seconds or a game-tick
/// counter advanced by the host. The two units are never mixed or
/// reconciled mid-session.
pub trait Clock: Send {
    fn now(&self) -> i64;
}

/// Seconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A shared tick counter. The host keeps a clone and advances it once per
/// simulation step; turns are then measured in game time, so a paused game
/// pauses the turn timer with it.
#[derive(Debug, Default, Clone)]
pub struct GameClock {
    ticks: Arc<AtomicI64>,
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: i64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.ticks.store(value, Ordering::Relaxed);
    }
}

impl Clock for GameClock {
    fn now(&self) -> i64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_clock_clones_share_the_counter() {
        let clock = GameClock::new();
        let handle = clock.clone();
        handle.advance(5);
        handle.advance(2);
        assert_eq!(clock.now(), 7);
        clock.set(100);
        assert_eq!(handle.now(), 100);
    }
}
