use crate::config::BreakerConfig;
use std::time::Instant;

/// Observable phase of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    /// Calls execute normally.
    Closed,
    /// Calls short-circuit with `CircuitOpen`.
    Open,
    /// A bounded number of probe calls test downstream health.
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "Closed"),
            CircuitPhase::Open => write!(f, "Open"),
            CircuitPhase::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// A phase change, handed back to the caller so events and the
/// `on_state_change` callback run outside the state mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitPhase,
    pub to: CircuitPhase,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { probes_outstanding: u32 },
}

/// Breaker state machine. All methods are called with the owning mutex
/// held; they are O(1) and return any transition for the caller to emit
/// after releasing the lock.
#[derive(Debug)]
pub(crate) struct Circuit {
    phase: Phase,
    /// Consecutive failures observed while `Closed`.
    consecutive_failures: u32,
    /// When the current failure streak began.
    streak_started: Option<Instant>,
    /// Probe successes accumulated while `HalfOpen`.
    probe_successes: u32,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Closed,
            consecutive_failures: 0,
            streak_started: None,
            probe_successes: 0,
        }
    }

    pub(crate) fn phase(&self) -> CircuitPhase {
        match self.phase {
            Phase::Closed => CircuitPhase::Closed,
            Phase::Open { .. } => CircuitPhase::Open,
            Phase::HalfOpen { .. } => CircuitPhase::HalfOpen,
        }
    }

    /// Decides whether a call may begin. While `Open`, the timeout elapsing
    /// moves the breaker to `HalfOpen` and the requesting call becomes the
    /// first probe.
    pub(crate) fn try_acquire(&mut self, config: &BreakerConfig) -> (bool, Option<Transition>) {
        match &mut self.phase {
            Phase::Closed => (true, None),
            Phase::Open { since } => {
                if since.elapsed() >= config.open_timeout {
                    let transition = self.transition_to(Phase::HalfOpen {
                        probes_outstanding: 1,
                    });
                    (true, transition)
                } else {
                    (false, None)
                }
            }
            Phase::HalfOpen { probes_outstanding } => {
                if *probes_outstanding < config.success_threshold {
                    *probes_outstanding += 1;
                    (true, None)
                } else {
                    (false, None)
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, config: &BreakerConfig) -> Option<Transition> {
        match &mut self.phase {
            Phase::Closed => {
                self.consecutive_failures = 0;
                self.streak_started = None;
                None
            }
            Phase::HalfOpen { probes_outstanding } => {
                *probes_outstanding = probes_outstanding.saturating_sub(1);
                self.probe_successes += 1;
                if self.probe_successes >= config.success_threshold {
                    self.transition_to(Phase::Closed)
                } else {
                    None
                }
            }
            // A call admitted before a reopen finished late; ignore.
            Phase::Open { .. } => None,
        }
    }

    pub(crate) fn record_failure(&mut self, config: &BreakerConfig) -> Option<Transition> {
        match self.phase {
            Phase::Closed => {
                let now = Instant::now();
                let streak_expired = self
                    .streak_started
                    .is_some_and(|started| now.duration_since(started) > config.sampling_duration);
                if streak_expired || self.streak_started.is_none() {
                    self.streak_started = Some(now);
                    self.consecutive_failures = 0;
                }
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(Phase::Open { since: now })
                } else {
                    None
                }
            }
            Phase::HalfOpen { .. } => self.transition_to(Phase::Open {
                since: Instant::now(),
            }),
            Phase::Open { .. } => None,
        }
    }

    /// An admitted call was cancelled; release its probe slot without
    /// recording downstream health either way.
    pub(crate) fn release_cancelled(&mut self) {
        if let Phase::HalfOpen { probes_outstanding } = &mut self.phase {
            *probes_outstanding = probes_outstanding.saturating_sub(1);
        }
    }

    pub(crate) fn force_open(&mut self) -> Option<Transition> {
        self.transition_to(Phase::Open {
            since: Instant::now(),
        })
    }

    pub(crate) fn force_closed(&mut self) -> Option<Transition> {
        self.transition_to(Phase::Closed)
    }

    fn transition_to(&mut self, phase: Phase) -> Option<Transition> {
        let from = self.phase();
        let to = match phase {
            Phase::Closed => CircuitPhase::Closed,
            Phase::Open { .. } => CircuitPhase::Open,
            Phase::HalfOpen { .. } => CircuitPhase::HalfOpen,
        };
        if from == to {
            return None;
        }

        self.phase = phase;
        self.consecutive_failures = 0;
        self.streak_started = None;
        self.probe_successes = 0;

        Some(Transition { from, to })
    }
}
