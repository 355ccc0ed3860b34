//! # Scheduler Module
//!
//! The contract the engine needs from a worker pool: accept a unit of work and
//! run it exactly once on some worker, and run a job after a delay unless the
//! timer is cancelled first.
//!
//! Two implementations ship with the crate:
//!
//! - [`WorkerPool`](crate::worker_pool::WorkerPool): `may` coroutines sharing one queue
//! - [`ManualScheduler`]: a deterministic queue driven by the caller, for tests
//!   and simulations of specific interleavings
//!
//! Every unit runs through [`WorkUnit::run`], which converts an error or panic
//! inside the task into a forced completion of the exchange, so a failing task
//! can neither crash a worker nor leave its exchange parked.

mod manual;

use crate::async_handle::AsyncHandle;
use crate::error::{panic_message, ContinuationError, Result};
use crate::ids::ExchangeId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub use manual::ManualScheduler;

/// Work scheduled by handler code against a suspended exchange.
pub type Task = Box<dyn FnOnce(&AsyncHandle) -> Result<()> + Send + 'static>;

/// A plain deferred job, used for deadline timers.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes work units and delayed jobs.
pub trait Scheduler: Send + Sync {
    /// Queue `unit` for exactly-once execution on some worker.
    fn submit(&self, unit: WorkUnit) -> Result<()>;

    /// Run `job` after `delay` unless the returned handle is cancelled first.
    fn schedule_after(&self, delay: Duration, job: Job) -> TimerHandle;
}

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation token for a delayed job.
///
/// A job that has not started by the time `cancel` is called never starts.
/// One that is already firing may still run, so jobs must check for
/// themselves whether their work is still wanted.
#[derive(Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    /// Releases whatever the scheduler holds for the timer (a sleeping coroutine, a queued job)
    on_cancel: Arc<Mutex<Option<CancelHook>>>,
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TimerHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install what `cancel` should release. Runs at once if already cancelled.
    pub fn set_cancel_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.on_cancel.lock();
        if self.is_cancelled() {
            drop(slot);
            hook();
        } else {
            *slot = Some(Box::new(hook));
        }
    }

    pub fn cancel(&self) {
        let hook = {
            let mut slot = self.on_cancel.lock();
            self.cancelled.store(true, Ordering::SeqCst);
            slot.take()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The task failed; its exchange has been force-completed.
    Failed(ContinuationError),
}

/// A task bound to the async handle it runs against.
pub struct WorkUnit {
    handle: AsyncHandle,
    task: Task,
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("exchange_id", &self.exchange_id())
            .finish_non_exhaustive()
    }
}

impl WorkUnit {
    #[must_use]
    pub fn new(handle: AsyncHandle, task: Task) -> Self {
        Self { handle, task }
    }

    #[must_use]
    pub fn exchange_id(&self) -> ExchangeId {
        self.handle.exchange().id()
    }

    /// Run the task, converting any failure into a forced completion.
    pub fn run(self) -> TaskOutcome {
        let WorkUnit { handle, task } = self;
        let exchange_id = handle.exchange().id();
        debug!(exchange_id = %exchange_id, "Task start");

        let failure = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task(&handle)))
        {
            Ok(Ok(())) => None,
            Ok(Err(e @ ContinuationError::TaskFailure { .. })) => Some(e),
            Ok(Err(e)) => Some(ContinuationError::TaskFailure {
                message: e.to_string(),
            }),
            Err(panic) => Some(ContinuationError::TaskFailure {
                message: panic_message(panic.as_ref()),
            }),
        };

        match failure {
            None => {
                debug!(exchange_id = %exchange_id, "Task complete");
                TaskOutcome::Completed
            }
            Some(err) => {
                error!(exchange_id = %exchange_id, error = %err, "Scheduled task failed");
                handle
                    .exchange()
                    .force_complete(err.status(), "scheduled task failed");
                TaskOutcome::Failed(err)
            }
        }
    }
}
