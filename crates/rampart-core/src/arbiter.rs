//! Single-writer turn arbitration. At most one client is active at any
//! instant; both timers are polled from the tick path rather than
//! scheduled, so their granularity is bounded by the tick rate.

use tracing::{debug, info};

use crate::clock::Clock;
use crate::host::{HostHooks, InputSink};
use crate::protocol::{Key, KeyModifiers};
use crate::registry::{ClientId, Registry};

/// Why a turn ended. Forced expiry is deliberately distinguishable from a
/// voluntary handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    Relinquished,
    Disconnected,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Seized { id: ClientId, nickname: String },
    Ended { id: ClientId, reason: TurnEnd },
}

#[derive(Debug)]
pub struct TurnArbiter {
    active: Option<ClientId>,
    idle_since: i64,
    /// Starts true so the idle action cannot fire before anyone has ever
    /// taken a turn; reset on every transition back to idle.
    idle_timed_out: bool,
    turn_duration: i64,
    idle_grace: i64,
    idle_checkpoint: bool,
    unpause_key: Key,
}

impl TurnArbiter {
    pub fn new(
        turn_duration: i64,
        idle_grace: i64,
        idle_checkpoint: bool,
        unpause_key: Key,
        now: i64,
    ) -> Self {
        Self {
            active: None,
            idle_since: now,
            idle_timed_out: true,
            turn_duration,
            idle_grace,
            idle_checkpoint,
            unpause_key,
        }
    }

    pub fn active(&self) -> Option<ClientId> {
        self.active
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Turn toggle: the active client relinquishes, a client seizes an
    /// idle session, and anything else is a no-op.
    pub fn request_turn(
        &mut self,
        id: ClientId,
        registry: &mut Registry,
        clock: &dyn Clock,
        hooks: &mut dyn HostHooks,
        input: &mut dyn InputSink,
    ) -> Option<TurnEvent> {
        if self.active == Some(id) {
            self.release(TurnEnd::Relinquished, clock)
        } else if self.active.is_none() {
            self.seize(id, registry, clock, hooks, input)
        } else {
            debug!(%id, "turn request ignored, another client is active");
            None
        }
    }

    fn seize(
        &mut self,
        id: ClientId,
        registry: &mut Registry,
        clock: &dyn Clock,
        hooks: &mut dyn HostHooks,
        input: &mut dyn InputSink,
    ) -> Option<TurnEvent> {
        let (nickname, label) = {
            let client = registry.lookup_mut(id)?;
            client.turn_started_at = clock.now();
            client.clear_dirty();
            (client.nickname.clone(), client.log_label().to_string())
        };
        self.active = Some(id);

        let announcement = if nickname.is_empty() {
            "A wandering spirit has seized control.".to_string()
        } else {
            format!("The spirit {nickname} has seized control.")
        };
        hooks.announce(&announcement);

        if hooks.is_paused() {
            // press-and-release nudge; harmless if the host unpaused underneath us
            input.inject_key(true, self.unpause_key, 0, KeyModifiers::default());
            input.inject_key(false, self.unpause_key, 0, KeyModifiers::default());
        }

        info!("{label} is now active");
        Some(TurnEvent::Seized { id, nickname })
    }

    /// Transition back to idle, restarting the idle grace period.
    pub fn release(&mut self, reason: TurnEnd, clock: &dyn Clock) -> Option<TurnEvent> {
        let id = self.active.take()?;
        self.idle_since = clock.now();
        self.idle_timed_out = false;
        Some(TurnEvent::Ended { id, reason })
    }

    /// Remaining turn time for the frame header, -1 meaning no limit. The
    /// timer only runs when a duration is configured and more than one
    /// client is connected; an uncontested turn is unlimited.
    pub fn time_left(&self, registry: &Registry, clock: &dyn Clock) -> i32 {
        self.turn_clock(registry, clock).0
    }

    fn turn_clock(&self, registry: &Registry, clock: &dyn Clock) -> (i32, bool) {
        let Some(id) = self.active else {
            return (-1, false);
        };
        if self.turn_duration == 0 || registry.len() <= 1 {
            return (-1, false);
        }
        let Some(client) = registry.lookup(id) else {
            return (-1, false);
        };
        let played = clock.now() - client.turn_started_at;
        if played < self.turn_duration {
            // the wire field is an i32; clamp oversized configured durations
            let remaining = (self.turn_duration - played).min(i32::MAX as i64) as i32;
            (remaining, false)
        } else {
            (-1, true)
        }
    }

    /// Force expiry once the turn clock runs out.
    pub fn poll_turn_timer(
        &mut self,
        registry: &Registry,
        clock: &dyn Clock,
    ) -> Option<TurnEvent> {
        let (_, expired) = self.turn_clock(registry, clock);
        if expired {
            self.release(TurnEnd::TimedOut, clock)
        } else {
            None
        }
    }

    /// Fire the idle action once per idle stretch after the grace period.
    pub fn poll_idle_timer(&mut self, clock: &dyn Clock, hooks: &mut dyn HostHooks) {
        if !self.idle_checkpoint || self.idle_timed_out || self.active.is_some() {
            return;
        }
        if clock.now() - self.idle_since > self.idle_grace {
            info!("idle grace period elapsed, triggering checkpoint");
            hooks.checkpoint();
            self.idle_timed_out = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::GameClock;

    #[derive(Default)]
    struct QuietHost {
        paused: bool,
        checkpoints: usize,
        announcements: Vec<String>,
        keys: Vec<(bool, Key)>,
    }

    impl HostHooks for QuietHost {
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn is_safe_to_escape(&self) -> bool {
            true
        }
        fn checkpoint(&mut self) {
            self.checkpoints += 1;
        }
        fn announce(&mut self, message: &str) {
            self.announcements.push(message.to_string());
        }
    }

    impl InputSink for QuietHost {
        fn inject_key(&mut self, pressed: bool, key: Key, _literal: u8, _mods: KeyModifiers) {
            self.keys.push((pressed, key));
        }
        fn request_resize(&mut self, _width: u8, _height: u8) {}
    }

    fn fixture() -> (TurnArbiter, Registry, GameClock) {
        let clock = GameClock::new();
        let arbiter = TurnArbiter::new(10, 5, true, Key::Space, clock.now());
        (arbiter, Registry::new(8), clock)
    }

    fn join(registry: &mut Registry, id: u64, nickname: &str) {
        registry
            .register(ClientId(id), nickname.into(), false, "test".into(), 4, 0)
            .unwrap();
    }

    #[test]
    fn toggle_seizes_relinquishes_and_ignores_contenders() {
        let (mut arbiter, mut registry, clock) = fixture();
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");
        join(&mut registry, 2, "");

        let event = arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert!(matches!(event, Some(TurnEvent::Seized { id: ClientId(1), .. })));
        assert_eq!(host.announcements, vec!["The spirit ada has seized control."]);

        // a contender's toggle is a no-op
        let event = arbiter.request_turn(ClientId(2), &mut registry, &clock, &mut host, &mut sink);
        assert!(event.is_none());
        assert_eq!(arbiter.active(), Some(ClientId(1)));

        // the holder's toggle releases
        let event = arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(
            event,
            Some(TurnEvent::Ended {
                id: ClientId(1),
                reason: TurnEnd::Relinquished
            })
        );
        assert!(arbiter.is_idle());

        // now the second client can seize, announced anonymously
        arbiter.request_turn(ClientId(2), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(
            host.announcements[1],
            "A wandering spirit has seized control."
        );
    }

    #[test]
    fn seizing_a_paused_host_sends_the_unpause_nudge() {
        let (mut arbiter, mut registry, clock) = fixture();
        let mut host = QuietHost {
            paused: true,
            ..QuietHost::default()
        };
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(sink.keys, vec![(true, Key::Space), (false, Key::Space)]);
    }

    #[test]
    fn idle_action_fires_once_per_idle_stretch() {
        let (mut arbiter, mut registry, clock) = fixture();
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");

        // never fires before the first turn
        clock.advance(100);
        arbiter.poll_idle_timer(&clock, &mut host);
        assert_eq!(host.checkpoints, 0);

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);

        clock.advance(6);
        arbiter.poll_idle_timer(&clock, &mut host);
        clock.advance(50);
        arbiter.poll_idle_timer(&clock, &mut host);
        assert_eq!(host.checkpoints, 1);

        // a fresh idle stretch re-arms it
        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        clock.advance(6);
        arbiter.poll_idle_timer(&clock, &mut host);
        assert_eq!(host.checkpoints, 2);
    }

    #[test]
    fn turn_timer_needs_contention() {
        let (mut arbiter, mut registry, clock) = fixture();
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(arbiter.time_left(&registry, &clock), -1);
        clock.advance(1000);
        assert!(arbiter.poll_turn_timer(&registry, &clock).is_none());

        // a second client starts the countdown
        join(&mut registry, 2, "bob");
        assert_eq!(arbiter.time_left(&registry, &clock), -1);

        // the holder's start time predates the contention, so expiry is due
        let event = arbiter.poll_turn_timer(&registry, &clock);
        assert_eq!(
            event,
            Some(TurnEvent::Ended {
                id: ClientId(1),
                reason: TurnEnd::TimedOut
            })
        );
    }

    #[test]
    fn turn_timer_counts_down_and_expires() {
        let (mut arbiter, mut registry, clock) = fixture();
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");
        join(&mut registry, 2, "bob");

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(arbiter.time_left(&registry, &clock), 10);
        clock.advance(4);
        assert_eq!(arbiter.time_left(&registry, &clock), 6);
        assert!(arbiter.poll_turn_timer(&registry, &clock).is_none());

        clock.advance(6);
        let event = arbiter.poll_turn_timer(&registry, &clock);
        assert!(matches!(
            event,
            Some(TurnEvent::Ended {
                reason: TurnEnd::TimedOut,
                ..
            })
        ));
        assert!(arbiter.is_idle());
    }

    #[test]
    fn oversized_durations_clamp_to_the_wire_field() {
        let clock = GameClock::new();
        let mut arbiter = TurnArbiter::new(i64::MAX, 5, true, Key::Space, clock.now());
        let mut registry = Registry::new(8);
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");
        join(&mut registry, 2, "bob");

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        assert_eq!(arbiter.time_left(&registry, &clock), i32::MAX);
        clock.advance(10);
        assert_eq!(arbiter.time_left(&registry, &clock), i32::MAX);
        assert!(arbiter.poll_turn_timer(&registry, &clock).is_none());
    }

    #[test]
    fn zero_duration_disables_the_timer() {
        let clock = GameClock::new();
        let mut arbiter = TurnArbiter::new(0, 5, true, Key::Space, clock.now());
        let mut registry = Registry::new(8);
        let mut host = QuietHost::default();
        let mut sink = QuietHost::default();
        join(&mut registry, 1, "ada");
        join(&mut registry, 2, "bob");

        arbiter.request_turn(ClientId(1), &mut registry, &clock, &mut host, &mut sink);
        clock.advance(100_000);
        assert_eq!(arbiter.time_left(&registry, &clock), -1);
        assert!(arbiter.poll_turn_timer(&registry, &clock).is_none());
    }
}
