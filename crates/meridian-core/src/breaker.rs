//! Per-agent circuit breaker over a rolling outcome window.
//!
//! Closed: calls flow, outcomes fill the window. When the window holds at
//! least `minimum_calls` outcomes and the failure rate reaches the threshold,
//! the breaker opens. Open: calls are rejected until `cooldown` elapses, then
//! the breaker half-opens and lets probes through. A probe failure reopens
//! it; `half_open_successes` probe successes close it with a fresh window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    pub window_size: usize,
    pub minimum_calls: usize,
    /// 0.0 to 1.0.
    pub failure_rate_threshold: f64,
    pub cooldown: Duration,
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 4,
            failure_rate_threshold: 0.5,
            cooldown: Duration::from_secs(30),
            half_open_successes: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// `true` = success.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_successes: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probe_successes: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call may proceed now. Moves Open to HalfOpen once the
    /// cooldown has elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled {
                    info!(breaker = %self.name, "circuit half-open, probing");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_successes = 0;
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.half_open_successes {
                    info!(breaker = %self.name, "circuit closed after successful probe");
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                }
            }
            _ => self.push_outcome(&mut inner, true),
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, circuit reopened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                self.push_outcome(&mut inner, false);
                if inner.state == CircuitState::Closed && self.threshold_reached(&inner) {
                    warn!(
                        breaker = %self.name,
                        failure_rate = Self::failure_rate(&inner),
                        "failure rate threshold reached, circuit opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.opened_at = None;
        inner.probe_successes = 0;
    }

    fn push_outcome(&self, inner: &mut BreakerInner, success: bool) {
        inner.window.push_back(success);
        while inner.window.len() > self.config.window_size.max(1) {
            inner.window.pop_front();
        }
    }

    fn threshold_reached(&self, inner: &BreakerInner) -> bool {
        inner.window.len() >= self.config.minimum_calls.max(1)
            && Self::failure_rate(inner) >= self.config.failure_rate_threshold
    }

    fn failure_rate(inner: &BreakerInner) -> f64 {
        if inner.window.is_empty() {
            return 0.0;
        }
        let failures = inner.window.iter().filter(|ok| !**ok).count();
        failures as f64 / inner.window.len() as f64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned breaker still holds consistent counters; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
