//! Circuit breaker guarding the generation backend
//!
//! State is process-wide and lives behind a single mutex. Every
//! read-decide-mutate sequence (admission, failure counting, transitions)
//! happens inside one critical section, and the lock is never held across an
//! `.await`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Error returned by [`CircuitBreaker::call`]
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without running the call
    #[error("circuit open, retry in {retry_after:?}")]
    Open { retry_after: Duration },

    /// The call ran and failed; the failure was counted
    #[error(transparent)]
    Failed(E),
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds since the last counted failure
    pub last_failure_secs_ago: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Open after `failure_threshold` consecutive failures, allow a trial after `cooldown`
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Run `f` through the breaker.
    ///
    /// Every `Err` returned by `f` counts as a failure. If the future is
    /// dropped while it is the half-open trial, the trial counts as failed.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self
            .acquire()
            .map_err(|retry_after| BreakerError::Open { retry_after })?;

        match f().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(BreakerError::Failed(e))
            }
        }
    }

    /// Reserve the right to call the dependency, or get the remaining cooldown
    pub fn acquire(&self) -> Result<CallPermit<'_>, Duration> {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit half-open, admitting trial call");
                    Ok(CallPermit::new(self, true))
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            // a trial is already in flight
            CircuitState::HalfOpen => Err(Duration::ZERO),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_secs_ago: inner
                .last_failure_at
                .map(|at| Instant::now().saturating_duration_since(at).as_secs()),
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            tracing::info!("trial call succeeded, circuit closed");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
        // Late successes from calls admitted before the circuit opened do not
        // close it; only the trial decides.
    }

    fn on_failure(&self, trial: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);

        if trial {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                "trial call failed, circuit re-opened"
            );
        } else if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "failure threshold reached, circuit opened"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Admission ticket for one call. Must be settled with
/// [`succeed`](Self::succeed) or [`fail`](Self::fail); a trial permit dropped
/// unsettled counts as a failure.
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            tracing::warn!("trial call abandoned before completion");
            self.breaker.on_failure(true);
        }
    }
}
