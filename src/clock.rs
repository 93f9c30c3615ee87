//! Per-side clocks: untimed, Fischer increment, and Bronstein delay modes.
//!
//! Ticking is externally driven — the clock owns no thread and reads no
//! wall time itself. Callers pass a monotonic millisecond timestamp into
//! every operation, which keeps the whole subsystem deterministic and
//! trivially testable.

use std::time::Duration;

use crate::piece::Colour;

/// A caller-supplied monotonic instant, in milliseconds. The unit the
/// relay server and controller agree to use for clock accounting; never
/// derived from a client-reported timestamp (those are
/// informational only).
pub type Timestamp = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    Untimed,
    Fischer,
    Bronstein,
}

/// One side's clock state.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub mode: ClockMode,
    pub base: Duration,
    pub increment: Duration,
    pub remaining: Duration,
    pub running: bool,
    pub started_at: Option<Timestamp>,
}

impl Clock {
    pub fn untimed() -> Self {
        Self {
            mode: ClockMode::Untimed,
            base: Duration::ZERO,
            increment: Duration::ZERO,
            remaining: Duration::ZERO,
            running: false,
            started_at: None,
        }
    }

    pub fn new(mode: ClockMode, base: Duration, increment: Duration) -> Self {
        Self { mode, base, increment, remaining: base, running: false, started_at: None }
    }

    /// Starts this clock at `now`. A no-op for `Untimed`.
    pub fn start(&mut self, now: Timestamp) {
        if self.mode == ClockMode::Untimed {
            return;
        }
        self.running = true;
        self.started_at = Some(now);
    }

    /// Stops the clock, deducting elapsed time (subject to the mode's
    /// delay/increment rule) and returning the elapsed [`Duration`] that
    /// was actually charged against `remaining`.
    pub fn stop(&mut self, now: Timestamp) -> Duration {
        if self.mode == ClockMode::Untimed || !self.running {
            return Duration::ZERO;
        }
        let Some(started_at) = self.started_at.take() else {
            self.running = false;
            return Duration::ZERO;
        };
        self.running = false;
        let elapsed = Duration::from_millis(now.saturating_sub(started_at));

        let charged = match self.mode {
            ClockMode::Untimed => Duration::ZERO,
            ClockMode::Fischer => {
                self.remaining = self.remaining.saturating_sub(elapsed);
                self.remaining += self.increment;
                elapsed
            }
            ClockMode::Bronstein => {
                let chargeable = elapsed.saturating_sub(self.increment);
                self.remaining = self.remaining.saturating_sub(chargeable);
                chargeable
            }
        };
        charged
    }

    /// `true` once `remaining` has been exhausted while the clock is
    /// running, evaluated against `now` without mutating state.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        if self.mode == ClockMode::Untimed || !self.running {
            return false;
        }
        let Some(started_at) = self.started_at else { return false };
        let elapsed = Duration::from_millis(now.saturating_sub(started_at));
        let chargeable = match self.mode {
            ClockMode::Untimed => return false,
            ClockMode::Fischer => elapsed,
            ClockMode::Bronstein => elapsed.saturating_sub(self.increment),
        };
        chargeable >= self.remaining
    }
}

/// The pair of clocks a [`crate::controller::GameController`] owns.
#[derive(Debug, Clone, Copy)]
pub struct ClockPair {
    pub red: Clock,
    pub black: Clock,
    expired_reported: bool,
}

impl ClockPair {
    pub fn untimed() -> Self {
        Self { red: Clock::untimed(), black: Clock::untimed(), expired_reported: false }
    }

    pub fn new(mode: ClockMode, base: Duration, increment: Duration) -> Self {
        Self {
            red: Clock::new(mode, base, increment),
            black: Clock::new(mode, base, increment),
            expired_reported: false,
        }
    }

    fn clock_mut(&mut self, colour: Colour) -> &mut Clock {
        match colour {
            Colour::Red => &mut self.red,
            Colour::Black => &mut self.black,
        }
    }

    pub fn clock(&self, colour: Colour) -> &Clock {
        match colour {
            Colour::Red => &self.red,
            Colour::Black => &self.black,
        }
    }

    /// Called when `colour` begins its turn.
    pub fn on_move_started(&mut self, colour: Colour, now: Timestamp) {
        self.clock_mut(colour).start(now);
    }

    /// Called when `colour` completes its move (and the opponent's clock
    /// should begin).
    pub fn on_move_ended(&mut self, colour: Colour, now: Timestamp) {
        self.clock_mut(colour).stop(now);
        self.clock_mut(colour.opposite()).start(now);
    }

    /// Reports expiration at most once per instance: the controller is
    /// responsible for transmuting the first `true` result into a
    /// `Timeout` game-ended event.
    pub fn check_expired(&mut self, now: Timestamp) -> Option<Colour> {
        if self.expired_reported {
            return None;
        }
        for colour in [Colour::Red, Colour::Black] {
            if self.clock(colour).is_expired(now) {
                self.expired_reported = true;
                return Some(colour);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fischer_increment_applied_after_deduction() {
        let mut pair = ClockPair::new(ClockMode::Fischer, Duration::from_secs(120), Duration::from_secs(5));
        pair.on_move_started(Colour::Red, 0);
        // Red takes 30 seconds.
        pair.on_move_ended(Colour::Red, 30_000);
        assert_eq!(pair.clock(Colour::Red).remaining, Duration::from_secs(95));
        assert_eq!(pair.clock(Colour::Black).remaining, Duration::from_secs(120));
        assert!(pair.clock(Colour::Black).running);
        assert!(!pair.clock(Colour::Red).running);
    }

    #[test]
    fn bronstein_delay_absorbs_time_under_the_increment() {
        let mut pair = ClockPair::new(ClockMode::Bronstein, Duration::from_secs(60), Duration::from_secs(10));
        pair.on_move_started(Colour::Red, 0);
        pair.on_move_ended(Colour::Red, 4_000);
        assert_eq!(pair.clock(Colour::Red).remaining, Duration::from_secs(60), "under the delay, nothing is deducted");
    }

    #[test]
    fn bronstein_delay_deducts_only_the_excess() {
        let mut pair = ClockPair::new(ClockMode::Bronstein, Duration::from_secs(60), Duration::from_secs(10));
        pair.on_move_started(Colour::Red, 0);
        pair.on_move_ended(Colour::Red, 15_000);
        assert_eq!(pair.clock(Colour::Red).remaining, Duration::from_secs(55));
    }

    #[test]
    fn untimed_never_expires() {
        let mut pair = ClockPair::untimed();
        pair.on_move_started(Colour::Red, 0);
        assert_eq!(pair.check_expired(u64::MAX), None);
    }

    #[test]
    fn expiration_reported_once() {
        let mut pair = ClockPair::new(ClockMode::Fischer, Duration::from_secs(10), Duration::ZERO);
        pair.on_move_started(Colour::Red, 0);
        assert_eq!(pair.check_expired(11_000), Some(Colour::Red));
        assert_eq!(pair.check_expired(12_000), None, "expiration is a one-shot signal");
    }
}
