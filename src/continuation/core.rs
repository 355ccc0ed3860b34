use crate::error::{ContinuationError, Result};
use serde::Serialize;
use std::fmt;

/// Where an exchange stands in its suspend/resume protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContinuationState {
    /// Synchronous dispatch in progress
    Idle,
    /// Handler called `start`, still running on the original thread
    Suspending,
    /// Handler returned; no thread owns the exchange
    Suspended,
    /// Internal redispatch requested
    Redispatching,
    /// `complete` accepted, output being flushed
    Completing,
    /// Terminal
    Completed,
    /// Terminal, forced by the suspension deadline
    Expired,
}

impl ContinuationState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Redispatching => "REDISPATCHING",
            Self::Completing => "COMPLETING",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
        }
    }

    /// `COMPLETING`, `COMPLETED` and `EXPIRED` refuse every further protocol call.
    #[must_use]
    pub fn is_finishing(self) -> bool {
        matches!(self, Self::Completing | Self::Completed | Self::Expired)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl fmt::Display for ContinuationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatcher must do once a handler has returned control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler started an async cycle; the exchange is now parked.
    /// `generation` identifies this particular suspension for the deadline timer.
    Suspended { generation: u64 },
    /// The handler neither started nor completed; the exchange is still `IDLE`.
    Synchronous,
    /// The exchange is already completing or completed.
    Finished,
}

/// The state tag plus the per-cycle bookkeeping the protocol needs.
///
/// A *cycle* is one synchronous handler invocation (outer or nested). `start`
/// may succeed at most once per cycle; a redispatch opens a new cycle.
#[derive(Debug, Clone)]
pub struct Continuation {
    state: ContinuationState,
    cycle: u64,
    started: bool,
    generation: u64,
}

impl Default for Continuation {
    fn default() -> Self {
        Self::new()
    }
}

impl Continuation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ContinuationState::Idle,
            cycle: 0,
            started: false,
            generation: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ContinuationState {
        self.state
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether `start` already succeeded in the current cycle.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Counter bumped every time the exchange enters `SUSPENDED`.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `IDLE → SUSPENDING`.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ContinuationState::Idle if !self.started => {
                self.started = true;
                self.state = ContinuationState::Suspending;
                Ok(())
            }
            state => Err(ContinuationError::illegal("start", state)),
        }
    }

    /// Called when the handler method returns to the dispatcher.
    ///
    /// `SUSPENDING → SUSPENDED`; any other state is reported without change.
    pub fn handler_returned(&mut self) -> Result<HandlerOutcome> {
        match self.state {
            ContinuationState::Suspending => {
                self.state = ContinuationState::Suspended;
                self.generation += 1;
                Ok(HandlerOutcome::Suspended {
                    generation: self.generation,
                })
            }
            ContinuationState::Idle => Ok(HandlerOutcome::Synchronous),
            ContinuationState::Completing
            | ContinuationState::Completed
            | ContinuationState::Expired => Ok(HandlerOutcome::Finished),
            state => Err(ContinuationError::illegal("return from handler", state)),
        }
    }

    /// `SUSPENDED → REDISPATCHING`.
    pub fn begin_redispatch(&mut self) -> Result<()> {
        match self.state {
            ContinuationState::Suspended => {
                self.state = ContinuationState::Redispatching;
                Ok(())
            }
            state => Err(ContinuationError::illegal("dispatch", state)),
        }
    }

    /// `REDISPATCHING → IDLE`, opening a fresh cycle for the nested dispatch.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContinuationState::Redispatching => {
                self.state = ContinuationState::Idle;
                self.cycle += 1;
                self.started = false;
                Ok(())
            }
            state => Err(ContinuationError::illegal("resume", state)),
        }
    }

    /// Any non-finishing state `→ COMPLETING`.
    pub fn begin_complete(&mut self) -> Result<()> {
        if self.state.is_finishing() {
            return Err(ContinuationError::illegal("complete", self.state));
        }
        self.state = ContinuationState::Completing;
        Ok(())
    }

    /// `COMPLETING → COMPLETED` or `EXPIRED → COMPLETED`.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            ContinuationState::Completing | ContinuationState::Expired => {
                self.state = ContinuationState::Completed;
                Ok(())
            }
            state => Err(ContinuationError::illegal("finish", state)),
        }
    }

    /// `SUSPENDED → EXPIRED`, only if still parked in the suspension identified
    /// by `generation`. A stale deadline is a no-op.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.state == ContinuationState::Suspended && self.generation == generation {
            self.state = ContinuationState::Expired;
            true
        } else {
            false
        }
    }
}
