//! # Worker Pool Module
//!
//! A [`Scheduler`] backed by `may` coroutines. N workers share one unbounded
//! queue and load-balance automatically; each unit is received by exactly one
//! worker and run through [`WorkUnit::run`], so task failures turn into forced
//! completions instead of dead workers.
//!
//! Deadline timers each get a coroutine that sleeps and then runs the job.
//! Cancelling the timer cancels the sleeping coroutine, so an exchange that
//! completes before its deadline does not keep a stack alive until then.
//!
//! ## Configuration
//!
//! - `CONTINUUM_WORKERS`: number of worker coroutines (default: 4)
//! - `CONTINUUM_STACK_SIZE`: stack size per coroutine (default: 64KB)

use crate::error::{ContinuationError, Result};
use crate::runtime_config::EngineConfig;
use crate::scheduler::{Job, Scheduler, TaskOutcome, TimerHandle, WorkUnit};
use may::sync::mpsc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    #[must_use]
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            stack_size,
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from(&EngineConfig::from_env())
    }
}

impl From<&EngineConfig> for WorkerPoolConfig {
    fn from(config: &EngineConfig) -> Self {
        Self::new(config.workers, config.stack_size)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Counters for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    pub submitted_count: AtomicU64,
    pub completed_count: AtomicU64,
    pub failed_count: AtomicU64,
    pub timers_fired: AtomicU64,
    /// Timer coroutines still alive, sleeping or firing
    pub active_timers: AtomicUsize,
    /// Queued and not yet finished (approximate)
    pub queue_depth: AtomicUsize,
}

impl WorkerPoolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submit(&self) {
        self.submitted_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed_count.fetch_add(1, Ordering::Relaxed),
            TaskOutcome::Failed(_) => self.failed_count.fetch_add(1, Ordering::Relaxed),
        };
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_submitted_count(&self) -> u64 {
        self.submitted_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_timers_fired(&self) -> u64 {
        self.timers_fired.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_active_timers(&self) -> usize {
        self.active_timers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

/// Coroutine worker pool
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// `None` once the pool has been shut down
    sender: Mutex<Option<mpsc::Sender<WorkUnit>>>,
    metrics: Arc<WorkerPoolMetrics>,
    name: String,
}

impl WorkerPool {
    /// Spawn the pool's worker coroutines.
    ///
    /// Workers that fail to spawn are logged and skipped; if none start, every
    /// submission fails with [`ContinuationError::SchedulerUnavailable`].
    #[must_use]
    pub fn new(name: &str, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<WorkUnit>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::new());

        info!(
            pool = %name,
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        let mut started = 0;
        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);
            let pool_name = name.to_string();

            // SAFETY: may's Builder::spawn is unsafe because coroutines must not
            // hold thread-local references across yields. The worker body only
            // owns Send + 'static data and never touches thread locals directly.
            let spawn_result = unsafe {
                may::coroutine::Builder::new()
                    .stack_size(config.stack_size)
                    .spawn(move || {
                        debug!(pool = %pool_name, worker_id, "Worker coroutine started");
                        // all workers share one receiver; whichever is free takes the next unit
                        while let Ok(unit) = rx.recv() {
                            let exchange_id = unit.exchange_id();
                            debug!(pool = %pool_name, worker_id, exchange_id = %exchange_id, "Worker picked up task");
                            let outcome = unit.run();
                            metrics.record_outcome(&outcome);
                        }
                        debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
                    })
            };

            match spawn_result {
                Ok(_) => started += 1,
                Err(e) => error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                ),
            }
        }

        Self {
            config,
            sender: Mutex::new((started > 0).then_some(tx)),
            metrics,
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self::new("continuum", WorkerPoolConfig::from(config))
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Stop accepting work. Queued units still run; workers exit once the queue drains.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            info!(pool = %self.name, "Worker pool shut down");
        }
    }
}

impl Scheduler for WorkerPool {
    fn submit(&self, unit: WorkUnit) -> Result<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!(pool = %self.name, exchange_id = %unit.exchange_id(), "Submit to a stopped worker pool");
            return Err(ContinuationError::SchedulerUnavailable);
        };

        self.metrics.record_submit();
        if let Err(e) = sender.send(unit) {
            self.metrics.queue_depth.fetch_sub(1, Ordering::Relaxed);
            error!(pool = %self.name, error = %e, "Worker pool channel disconnected");
            return Err(ContinuationError::SchedulerUnavailable);
        }
        Ok(())
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        let metrics = Arc::clone(&self.metrics);
        // Shared with the cancel hook, which drops the job as soon as the timer is cancelled.
        let job = Arc::new(Mutex::new(Some(job)));
        let fire = {
            let job = Arc::clone(&job);
            let metrics = Arc::clone(&metrics);
            move || {
                let taken = {
                    let mut slot = job.lock();
                    if timer.is_cancelled() {
                        None
                    } else {
                        slot.take()
                    }
                };
                if let Some(job) = taken {
                    metrics.record_timer_fired();
                    job();
                }
            }
        };

        let active = ActiveTimer::enter(Arc::clone(&metrics));
        // SAFETY: the timer body owns only Send + 'static data and uses no thread locals.
        let spawned = unsafe {
            let fire = fire.clone();
            may::coroutine::Builder::new()
                .stack_size(self.config.stack_size)
                .spawn(move || {
                    let _active = active;
                    may::coroutine::sleep(delay);
                    fire();
                })
        };

        match spawned {
            Ok(sleeper) => handle.set_cancel_hook(move || {
                job.lock().take();
                if !sleeper.is_done() {
                    // SAFETY: cancelling only unwinds the sleeper at its next yield
                    // point; it holds no locks while asleep.
                    unsafe { sleeper.coroutine().cancel() };
                }
            }),
            Err(e) => {
                warn!(pool = %self.name, error = %e, "Timer coroutine spawn failed - using a thread");
                let active = ActiveTimer::enter(metrics);
                handle.set_cancel_hook(move || {
                    job.lock().take();
                });
                std::thread::spawn(move || {
                    let _active = active;
                    std::thread::sleep(delay);
                    fire();
                });
            }
        }
        handle
    }
}

/// Counts a live timer coroutine; dropped when it returns or is cancelled.
struct ActiveTimer(Arc<WorkerPoolMetrics>);

impl ActiveTimer {
    fn enter(metrics: Arc<WorkerPoolMetrics>) -> Self {
        metrics.active_timers.fetch_add(1, Ordering::Relaxed);
        Self(metrics)
    }
}

impl Drop for ActiveTimer {
    fn drop(&mut self) {
        self.0.active_timers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
