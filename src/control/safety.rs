//! safety.rs
//! Per-motor safety automaton that overrides PI output while sensing is invalid.
//!
//! Normal → Deflating → [Releasing] → WaitingForValid → Normal
//!
//! - Deflating: fixed reverse duty until `deflate` elapses, or earlier once the
//!   measurement has dropped to the safe threshold (when one is configured).
//! - Releasing: optional extra reverse time; returns straight to Normal if
//!   validity comes back mid-release.
//! - WaitingForValid: brake until the range is valid again and, with a safe
//!   threshold configured, the measurement is below it.
//!
//! At most one transition per call. Motors never share a machine.

use crate::config::SafetyConfig;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SafetyState {
    #[default]
    Normal = 0,
    Deflating = 1,
    Releasing = 2,
    WaitingForValid = 3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyPolicy {
    /// Magnitude of the reverse command (%).
    pub reverse_duty: f32,
    pub deflate: Duration,
    pub release: Option<Duration>,
    pub safe_threshold: Option<f32>,
}

impl From<&SafetyConfig> for SafetyPolicy {
    fn from(c: &SafetyConfig) -> Self {
        Self {
            reverse_duty: c.reverse_duty,
            deflate: Duration::from_millis(c.deflate_ms),
            release: c.release_ms.map(Duration::from_millis),
            safe_threshold: c.safe_threshold,
        }
    }
}

impl SafetyPolicy {
    /// Fixed command for a non-Normal state.
    pub fn command_for(&self, state: SafetyState) -> Option<f32> {
        match state {
            SafetyState::Normal => None,
            SafetyState::Deflating | SafetyState::Releasing => Some(-self.reverse_duty),
            SafetyState::WaitingForValid => Some(0.0),
        }
    }

    /// Upper bound on the time from a trip to WaitingForValid.
    pub fn unwind_bound(&self) -> Duration {
        self.deflate + self.release.unwrap_or_default()
    }
}

/// Outcome of one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyStep {
    /// Overrides the PI command when set.
    pub command: Option<f32>,
    pub transition: Option<(SafetyState, SafetyState)>,
    /// The motor just returned to Normal; its integrator must be zeroed.
    pub reset_controller: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyMachine {
    state: SafetyState,
    entered_at: Instant,
}

impl SafetyMachine {
    pub fn new(now: Instant) -> Self {
        Self {
            state: SafetyState::Normal,
            entered_at: now,
        }
    }

    #[inline]
    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// Time spent in the current state.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    fn enter(&mut self, next: SafetyState, now: Instant) -> Option<(SafetyState, SafetyState)> {
        let from = self.state;
        self.state = next;
        self.entered_at = now;
        Some((from, next))
    }

    /// Advance the automaton for one control cycle.
    ///
    /// `valid` is true when the motor's range is Far/Medium/Close and its
    /// setpoint is usable.
    pub fn update(&mut self, policy: &SafetyPolicy, valid: bool, measurement: f32, now: Instant) -> SafetyStep {
        let elapsed = self.elapsed(now);
        let below_threshold = |strict: bool| match policy.safe_threshold {
            Some(t) if strict => measurement < t,
            Some(t) => measurement <= t,
            None => false,
        };

        let mut reset_controller = false;
        let current = self.state;
        let transition = match current {
            SafetyState::Normal if !valid => self.enter(SafetyState::Deflating, now),
            SafetyState::Normal => None,

            SafetyState::Deflating if elapsed >= policy.deflate || below_threshold(false) => {
                let next = if policy.release.is_some() {
                    SafetyState::Releasing
                } else {
                    SafetyState::WaitingForValid
                };
                self.enter(next, now)
            }
            SafetyState::Deflating => None,

            SafetyState::Releasing if valid => {
                reset_controller = true;
                self.enter(SafetyState::Normal, now)
            }
            SafetyState::Releasing if elapsed >= policy.release.unwrap_or_default() => {
                self.enter(SafetyState::WaitingForValid, now)
            }
            SafetyState::Releasing => None,

            SafetyState::WaitingForValid
                if valid && (policy.safe_threshold.is_none() || below_threshold(true)) =>
            {
                reset_controller = true;
                self.enter(SafetyState::Normal, now)
            }
            SafetyState::WaitingForValid => None,
        };

        SafetyStep {
            command: policy.command_for(self.state),
            transition,
            reset_controller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn timed_policy() -> SafetyPolicy {
        SafetyPolicy {
            reverse_duty: 60.0,
            deflate: 100 * MS,
            release: Some(50 * MS),
            safe_threshold: None,
        }
    }

    /// Step at 20 ms ticks until the machine reaches `state`.
    fn run_until(
        m: &mut SafetyMachine,
        p: &SafetyPolicy,
        t0: Instant,
        valid: bool,
        measurement: f32,
        state: SafetyState,
    ) -> Duration {
        for tick in 1..=1_000u32 {
            let now = t0 + 20 * MS * tick;
            m.update(p, valid, measurement, now);
            if m.state() == state {
                return now - t0;
            }
        }
        panic!("never reached {:?}", state);
    }

    #[test]
    fn stays_normal_while_valid() {
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        let step = m.update(&timed_policy(), true, 1.0, t0);
        assert_eq!(step.command, None);
        assert_eq!(step.transition, None);
        assert_eq!(m.state(), SafetyState::Normal);
    }

    #[test]
    fn invalid_reading_trips_and_reverses_immediately() {
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        let step = m.update(&timed_policy(), false, 1.0, t0);
        assert_eq!(step.transition, Some((SafetyState::Normal, SafetyState::Deflating)));
        assert_eq!(step.command, Some(-60.0));
    }

    #[test]
    fn reaches_waiting_within_deflate_plus_release() {
        let p = timed_policy();
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 1.0, t0);
        let took = run_until(&mut m, &p, t0, false, 1.0, SafetyState::WaitingForValid);
        // One tick of slack per state change for period quantisation.
        assert!(took <= p.unwind_bound() + 2 * 20 * MS, "{:?}", took);

        let step = m.update(&p, false, 1.0, t0 + 10 * p.unwind_bound());
        assert_eq!(step.command, Some(0.0));
    }

    #[test]
    fn returns_to_normal_with_reset_on_first_valid_cycle() {
        let p = timed_policy();
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 1.0, t0);
        run_until(&mut m, &p, t0, false, 1.0, SafetyState::WaitingForValid);

        let step = m.update(&p, true, 1.0, t0 + Duration::from_secs(5));
        assert_eq!(step.transition, Some((SafetyState::WaitingForValid, SafetyState::Normal)));
        assert!(step.reset_controller);
        assert_eq!(step.command, None);
    }

    #[test]
    fn skips_releasing_when_not_configured() {
        let p = SafetyPolicy {
            release: None,
            ..timed_policy()
        };
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 1.0, t0);
        let step = m.update(&p, false, 1.0, t0 + p.deflate);
        assert_eq!(step.transition, Some((SafetyState::Deflating, SafetyState::WaitingForValid)));
    }

    #[test]
    fn validity_mid_release_returns_to_normal() {
        let p = timed_policy();
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 1.0, t0);
        m.update(&p, false, 1.0, t0 + p.deflate);
        assert_eq!(m.state(), SafetyState::Releasing);

        let step = m.update(&p, true, 1.0, t0 + p.deflate + 10 * MS);
        assert_eq!(step.transition, Some((SafetyState::Releasing, SafetyState::Normal)));
        assert!(step.reset_controller);
    }

    #[test]
    fn one_transition_per_update() {
        let p = timed_policy();
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 1.0, t0);
        // Far in the future: both timers have expired, still only one hop.
        m.update(&p, false, 1.0, t0 + Duration::from_secs(60));
        assert_eq!(m.state(), SafetyState::Releasing);
    }

    #[test]
    fn pressure_gate_ends_deflation_early_and_blocks_recovery() {
        let p = SafetyPolicy {
            safe_threshold: Some(5.0),
            ..timed_policy()
        };
        let t0 = Instant::now();
        let mut m = SafetyMachine::new(t0);
        m.update(&p, false, 9.0, t0);

        // Still loaded: keeps deflating before the timer expires.
        m.update(&p, false, 7.0, t0 + 20 * MS);
        assert_eq!(m.state(), SafetyState::Deflating);
        // Dropped to the threshold: on to Releasing without waiting the full deflate time.
        m.update(&p, false, 5.0, t0 + 40 * MS);
        assert_eq!(m.state(), SafetyState::Releasing);

        m.update(&p, false, 3.0, t0 + 200 * MS);
        assert_eq!(m.state(), SafetyState::WaitingForValid);

        // Valid again but pad still above threshold: hold.
        m.update(&p, true, 6.0, t0 + 300 * MS);
        assert_eq!(m.state(), SafetyState::WaitingForValid);
        m.update(&p, true, 4.0, t0 + 320 * MS);
        assert_eq!(m.state(), SafetyState::Normal);
    }
}
