use super::{Job, Scheduler, TaskOutcome, TimerHandle, WorkUnit};
use crate::error::{ContinuationError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

struct PendingTimer {
    due: Duration,
    handle: TimerHandle,
    job: Job,
}

#[derive(Default)]
struct ManualState {
    queue: VecDeque<WorkUnit>,
    timers: Vec<PendingTimer>,
    now: Duration,
    closed: bool,
}

/// Deterministic scheduler: nothing runs until the caller says so.
///
/// Work is queued by `submit` and executed by [`run_next`](Self::run_next),
/// [`run_newest`](Self::run_newest) or [`run_pending`](Self::run_pending) on
/// the calling thread. Time is virtual and only moves with
/// [`advance`](Self::advance).
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued work units.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Timers neither fired nor cancelled. Drops cancelled ones as it counts.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        let mut state = self.state.lock();
        state.timers.retain(|t| !t.handle.is_cancelled());
        state.timers.len()
    }

    /// Run the oldest queued unit.
    pub fn run_next(&self) -> Option<TaskOutcome> {
        let unit = self.state.lock().queue.pop_front();
        unit.map(WorkUnit::run)
    }

    /// Run the most recently queued unit.
    pub fn run_newest(&self) -> Option<TaskOutcome> {
        let unit = self.state.lock().queue.pop_back();
        unit.map(WorkUnit::run)
    }

    /// Run queued units, including ones they submit, until the queue is empty.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next().is_some() {
            ran += 1;
        }
        ran
    }

    /// Move virtual time forward and fire every due, uncancelled timer.
    /// Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            let (due, waiting): (Vec<_>, Vec<_>) =
                state.timers.drain(..).partition(|t| t.due <= now);
            state.timers = waiting;
            due
        };

        let mut fired = 0;
        for timer in due {
            if !timer.handle.is_cancelled() {
                (timer.job)();
                fired += 1;
            }
        }
        fired
    }

    /// Refuse all further submissions.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl Scheduler for ManualScheduler {
    fn submit(&self, unit: WorkUnit) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ContinuationError::SchedulerUnavailable);
        }
        state.queue.push_back(unit);
        Ok(())
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        state.timers.retain(|t| !t.handle.is_cancelled());
        let due = state.now + delay;
        state.timers.push(PendingTimer {
            due,
            handle: handle.clone(),
            job,
        });
        handle
    }
}
