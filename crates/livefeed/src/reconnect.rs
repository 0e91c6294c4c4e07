//! Reconnection controller.
//!
//! Owns the retry state machine and attempt counting. The state machine is
//! an explicit enum with a pure transition function; the controller wraps
//! it with the attempt counter and a timer generation counter so a stale
//! backoff timer can never act after a reset or teardown.

use crate::backoff::{Backoff, BackoffPolicy};
use crate::config::RetryLimit;
use std::time::Duration;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No connection requested yet.
    Idle,
    /// An open is in flight. The transport may be up, but the remote has
    /// not sent data yet; first *data* is the liveness baseline.
    Connecting,
    /// First data received; the attempt counter has been reset.
    Connected,
    /// A backoff timer is pending.
    ReconnectScheduled,
    /// Finite retry budget exceeded. Terminal.
    Exhausted,
    /// Explicit teardown. Terminal and idempotent.
    Destroyed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectEvent {
    OpenRequested,
    FirstData,
    ConnectionLost,
    BackoffElapsed,
    RetriesExhausted,
    Teardown,
}

/// Pure transition function. Unknown combinations leave the state alone.
pub fn transition(state: ReconnectState, event: ReconnectEvent) -> ReconnectState {
    use ReconnectEvent::*;
    use ReconnectState::*;

    match (state, event) {
        (Destroyed, _) => Destroyed,
        (_, Teardown) => Destroyed,
        (Exhausted, _) => Exhausted,
        (Idle, OpenRequested) => Connecting,
        (Connected, OpenRequested) => Connecting,
        (ReconnectScheduled, OpenRequested) => Connecting,
        (ReconnectScheduled, BackoffElapsed) => Connecting,
        (ReconnectScheduled, RetriesExhausted) => Exhausted,
        (Connecting, FirstData) => Connected,
        (Connecting, ConnectionLost) | (Connected, ConnectionLost) => ReconnectScheduled,
        (state, _) => state,
    }
}

/// Outcome of scheduling one more reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Wait `delay`, then reconnect. `generation` identifies the timer;
    /// a fire with a stale generation must be ignored.
    Retry {
        attempt: u32,
        delay: Duration,
        generation: u64,
    },
    /// Budget spent; the player gives up.
    Exhausted { attempts: u32 },
}

/// Retry/backoff policy owner for one player instance.
#[derive(Debug)]
pub struct ReconnectController {
    state: ReconnectState,
    attempts: u32,
    policy: BackoffPolicy,
    generation: u64,
}

impl ReconnectController {
    pub fn new(limit: RetryLimit, fixed_interval: Duration) -> Self {
        Self {
            state: ReconnectState::Idle,
            attempts: 0,
            policy: BackoffPolicy::new(limit, fixed_interval),
            generation: 0,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_open_requested(&mut self) {
        self.state = transition(self.state, ReconnectEvent::OpenRequested);
    }

    /// First data arrived on a fresh connection: the liveness baseline and
    /// the point at which the attempt counter resets to zero.
    pub fn on_first_data(&mut self) {
        self.state = transition(self.state, ReconnectEvent::FirstData);
        if self.state == ReconnectState::Connected {
            self.attempts = 0;
        }
    }

    pub fn on_backoff_elapsed(&mut self) {
        self.state = transition(self.state, ReconnectEvent::BackoffElapsed);
    }

    /// Record a lost connection and decide the next step. Increments the
    /// attempt counter on every scheduling.
    pub fn schedule(&mut self) -> Schedule {
        self.state = transition(self.state, ReconnectEvent::ConnectionLost);
        self.attempts += 1;
        match self.policy.delay_for_attempt(self.attempts) {
            Backoff::Delay(delay) => {
                self.generation += 1;
                Schedule::Retry {
                    attempt: self.attempts,
                    delay,
                    generation: self.generation,
                }
            }
            Backoff::Exhausted => {
                self.state = transition(self.state, ReconnectEvent::RetriesExhausted);
                Schedule::Exhausted {
                    attempts: self.attempts,
                }
            }
        }
    }

    /// Whether a timer generation is still the live one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Invalidate every outstanding backoff timer.
    pub fn invalidate_timers(&mut self) {
        self.generation += 1;
    }

    /// External request against a new target resets the attempt budget.
    /// A caller-initiated retry of the same target does not.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    pub fn destroy(&mut self) {
        self.state = transition(self.state, ReconnectEvent::Teardown);
        self.invalidate_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_absorbs_everything() {
        use ReconnectEvent::*;
        for event in [
            OpenRequested,
            FirstData,
            ConnectionLost,
            BackoffElapsed,
            RetriesExhausted,
            Teardown,
        ] {
            assert_eq!(
                transition(ReconnectState::Destroyed, event),
                ReconnectState::Destroyed
            );
        }
    }

    #[test]
    fn happy_path_transitions() {
        let state = transition(ReconnectState::Idle, ReconnectEvent::OpenRequested);
        assert_eq!(state, ReconnectState::Connecting);
        let state = transition(state, ReconnectEvent::FirstData);
        assert_eq!(state, ReconnectState::Connected);
        let state = transition(state, ReconnectEvent::ConnectionLost);
        assert_eq!(state, ReconnectState::ReconnectScheduled);
        let state = transition(state, ReconnectEvent::BackoffElapsed);
        assert_eq!(state, ReconnectState::Connecting);
    }

    #[test]
    fn open_without_data_does_not_reach_connected() {
        // The transport can open without the remote ever sending anything.
        let state = transition(ReconnectState::Idle, ReconnectEvent::OpenRequested);
        let state = transition(state, ReconnectEvent::ConnectionLost);
        assert_eq!(state, ReconnectState::ReconnectScheduled);
    }

    #[test]
    fn unbounded_schedules_follow_the_table() {
        let mut controller =
            ReconnectController::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        controller.on_open_requested();
        let expected_ms = [1000, 3000, 5000, 10000, 20000, 30000, 60000, 60000];
        for (index, ms) in expected_ms.iter().enumerate() {
            match controller.schedule() {
                Schedule::Retry { attempt, delay, .. } => {
                    assert_eq!(attempt, index as u32 + 1);
                    assert_eq!(delay, Duration::from_millis(*ms));
                }
                Schedule::Exhausted { .. } => panic!("unbounded mode never exhausts"),
            }
        }
    }

    #[test]
    fn bounded_exhausts_on_the_sixth_scheduling() {
        let mut controller =
            ReconnectController::new(RetryLimit::Bounded(5), Duration::from_millis(200));
        controller.on_open_requested();
        for attempt in 1..=5 {
            match controller.schedule() {
                Schedule::Retry {
                    attempt: scheduled,
                    delay,
                    ..
                } => {
                    assert_eq!(scheduled, attempt);
                    assert_eq!(delay, Duration::from_millis(200));
                }
                Schedule::Exhausted { .. } => panic!("exhausted too early"),
            }
            controller.on_backoff_elapsed();
        }
        assert_eq!(
            controller.schedule(),
            Schedule::Exhausted { attempts: 6 }
        );
        assert_eq!(controller.state(), ReconnectState::Exhausted);
    }

    #[test]
    fn first_data_resets_the_attempt_counter() {
        let mut controller =
            ReconnectController::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        controller.on_open_requested();
        controller.schedule();
        controller.schedule();
        assert_eq!(controller.attempts(), 2);
        controller.on_backoff_elapsed();
        controller.on_first_data();
        assert_eq!(controller.attempts(), 0);
        assert_eq!(controller.state(), ReconnectState::Connected);
    }

    #[test]
    fn stale_generations_are_detected() {
        let mut controller =
            ReconnectController::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        controller.on_open_requested();
        let generation = match controller.schedule() {
            Schedule::Retry { generation, .. } => generation,
            Schedule::Exhausted { .. } => unreachable!(),
        };
        assert!(controller.is_current(generation));
        controller.invalidate_timers();
        assert!(!controller.is_current(generation));
    }
}
