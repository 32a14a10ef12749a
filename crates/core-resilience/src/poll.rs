//! Bounded polling wait: Running → {Completed, TimedOut}
//!
//! The remote service offers no completion callback, so long-running commands
//! are observed by reading their status at a fixed interval until they report
//! completion or a deadline passes. Timing out only stops the local wait; the
//! remote command keeps running.
//!
//! State is threaded through the step function by value, so whatever output
//! has accumulated when the deadline passes is returned with the timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default interval between status reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one status read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState<S> {
    /// Still running; keep polling with this state
    Running(S),
    /// Finished with this final state
    Completed(S),
}

/// Terminal outcome of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<S> {
    Completed { state: S, elapsed: Duration },
    TimedOut { partial: S, elapsed: Duration },
}

impl<S> PollOutcome<S> {
    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Completed { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn into_state(self) -> S {
        match self {
            PollOutcome::Completed { state, .. } => state,
            PollOutcome::TimedOut { partial, .. } => partial,
        }
    }
}

/// A fixed-interval poll with a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    pub interval: Duration,
    pub timeout: Duration,
}

impl BoundedPoll {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The same poll with only the budget left since `started`
    ///
    /// Waits that run in phases share one deadline this way.
    pub fn remaining_since(&self, started: Instant) -> Self {
        Self {
            interval: self.interval,
            timeout: self.timeout.saturating_sub(started.elapsed()),
        }
    }

    /// Drive `step` until it reports completion or the deadline passes
    ///
    /// The first read happens immediately. The sleep before the final read is
    /// clamped to the deadline, so a wait that never completes returns no later
    /// than `timeout` plus the duration of one read. Errors from `step` abort the
    /// wait and are returned unchanged.
    pub async fn run<S, F, Fut, E>(&self, initial: S, mut step: F) -> Result<PollOutcome<S>, E>
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = Result<PollState<S>, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut state = initial;
        let mut reads = 0u32;

        loop {
            reads += 1;
            match step(state).await? {
                PollState::Completed(done) => {
                    let elapsed = start.elapsed();
                    debug!(reads, ?elapsed, "Poll completed");
                    return Ok(PollOutcome::Completed {
                        state: done,
                        elapsed,
                    });
                }
                PollState::Running(next) => {
                    let now = Instant::now();
                    if now >= deadline {
                        let elapsed = start.elapsed();
                        warn!(reads, ?elapsed, timeout = ?self.timeout, "Poll timed out");
                        return Ok(PollOutcome::TimedOut {
                            partial: next,
                            elapsed,
                        });
                    }
                    state = next;
                    tokio::time::sleep(self.interval.min(deadline - now)).await;
                }
            }
        }
    }
}

impl Default for BoundedPoll {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
