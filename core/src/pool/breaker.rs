use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Health mode of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BreakerMode {
    /// Healthy; calls are admitted.
    #[default]
    Closed,
    /// Blocking; calls fail fast until the cooldown elapses.
    Open,
    /// Probing recovery with a single admitted call.
    HalfOpen,
}

impl fmt::Display for BreakerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Result of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single recovery probe; bypasses the concurrency ceiling.
    Probe,
    Rejected,
}

/// A mode change worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerMode,
    pub to: BreakerMode,
}

/// Per-provider circuit breaker.
///
/// Transitions only along `Closed -> Open -> HalfOpen -> {Closed | Open}`
/// (plus the sweep's stale reset back to `Closed`).
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    mode: BreakerMode,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    retry_at: Option<Instant>,
    probe_in_flight: bool,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            mode: BreakerMode::Closed,
            consecutive_failures: 0,
            last_failure: None,
            retry_at: None,
            probe_in_flight: false,
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn mode(&self) -> BreakerMode {
        self.mode
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    pub fn admit(&mut self, now: Instant) -> (Admission, Option<Transition>) {
        match self.mode {
            BreakerMode::Closed => (Admission::Allowed, None),
            BreakerMode::Open => {
                let ready = self.retry_at.map(|at| now >= at).unwrap_or(true);
                if !ready {
                    return (Admission::Rejected, None);
                }
                self.probe_in_flight = true;
                let t = self.transition(BreakerMode::HalfOpen);
                (Admission::Probe, t)
            }
            BreakerMode::HalfOpen => {
                if self.probe_in_flight {
                    (Admission::Rejected, None)
                } else {
                    self.probe_in_flight = true;
                    (Admission::Probe, None)
                }
            }
        }
    }

    /// Records a successful call. Only the half-open probe (`probe == true`)
    /// can close the breaker; other calls settling while `Open` or `HalfOpen`
    /// were admitted before it opened and leave it untouched.
    pub fn record_success(&mut self, probe: bool) -> Option<Transition> {
        match (self.mode, probe) {
            (BreakerMode::Closed, _) => {
                self.consecutive_failures = 0;
                None
            }
            (BreakerMode::HalfOpen, true) => {
                self.consecutive_failures = 0;
                self.probe_in_flight = false;
                self.retry_at = None;
                self.transition(BreakerMode::Closed)
            }
            (BreakerMode::Open | BreakerMode::HalfOpen, _) => None,
        }
    }

    /// Records a failed call. A failed probe re-opens the breaker; a straggler
    /// failing while `Open` or `HalfOpen` only refreshes `last_failure`.
    pub fn record_failure(&mut self, now: Instant, probe: bool) -> Option<Transition> {
        self.last_failure = Some(now);
        match (self.mode, probe) {
            (BreakerMode::Closed, _) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.threshold {
                    self.trip(now)
                } else {
                    None
                }
            }
            (BreakerMode::HalfOpen, true) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.probe_in_flight = false;
                self.trip(now)
            }
            (BreakerMode::Open | BreakerMode::HalfOpen, _) => None,
        }
    }

    /// Whether the failure history is older than `max_age` and can be forgotten.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        if self.mode == BreakerMode::Closed && self.consecutive_failures == 0 {
            return false;
        }
        if self.probe_in_flight {
            return false;
        }
        self.last_failure
            .map(|at| now.saturating_duration_since(at) >= max_age)
            .unwrap_or(false)
    }

    pub fn reset(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.retry_at = None;
        self.probe_in_flight = false;
        self.transition(BreakerMode::Closed)
    }

    fn trip(&mut self, now: Instant) -> Option<Transition> {
        self.retry_at = Some(now + self.cooldown);
        self.transition(BreakerMode::Open)
    }

    fn transition(&mut self, to: BreakerMode) -> Option<Transition> {
        let from = self.mode;
        self.mode = to;
        (from != to).then_some(Transition { from, to })
    }
}
