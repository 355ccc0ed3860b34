use crate::async_handle::AsyncHandle;
use crate::continuation::{ContinuationState, HandlerOutcome};
use crate::error::{panic_message, ContinuationError, Result};
use crate::exchange::{Exchange, RequestView, ResponseView};
use crate::registry::{Handler, HandlerRegistry};
use crate::runtime_config::EngineConfig;
use crate::scheduler::{Scheduler, Task, WorkUnit};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Status used when a suspension outlives its deadline.
const EXPIRED_STATUS: u16 = 500;

/// What a handler sees while it runs.
///
/// Bound to the dispatch cycle it was created for: an [`AsyncHandle`] taken
/// from a context cannot start a suspension on a later cycle.
pub struct HandlerContext {
    engine: Arc<DispatchEngine>,
    exchange: Arc<Exchange>,
    cycle: u64,
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("exchange_id", &self.exchange.id())
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl HandlerContext {
    fn new(engine: Arc<DispatchEngine>, exchange: Arc<Exchange>) -> Self {
        let cycle = exchange.cycle();
        Self {
            engine,
            exchange,
            cycle,
        }
    }

    #[must_use]
    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    #[must_use]
    pub fn request(&self) -> RequestView<'_> {
        RequestView::new(&self.exchange)
    }

    #[must_use]
    pub fn response(&self) -> ResponseView<'_> {
        ResponseView::new(&self.exchange)
    }

    /// Handle for suspending this dispatch and scheduling work against it.
    #[must_use]
    pub fn async_handle(&self) -> AsyncHandle {
        AsyncHandle::bound(
            Arc::clone(&self.engine),
            Arc::clone(&self.exchange),
            self.cycle,
        )
    }

    /// Start the suspension and return the handle in one step.
    pub fn start_async(&self) -> Result<AsyncHandle> {
        let handle = self.async_handle();
        handle.start()?;
        Ok(handle)
    }
}

/// Resolves paths, runs handlers and drives the continuation after they return.
pub struct DispatchEngine {
    registry: HandlerRegistry,
    scheduler: Arc<dyn Scheduler>,
    async_timeout: Duration,
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("registry", &self.registry)
            .field("async_timeout", &self.async_timeout)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    #[must_use]
    pub fn new(
        registry: HandlerRegistry,
        scheduler: Arc<dyn Scheduler>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        Self::with_timeout(registry, scheduler, config.async_timeout())
    }

    #[must_use]
    pub fn with_timeout(
        registry: HandlerRegistry,
        scheduler: Arc<dyn Scheduler>,
        async_timeout: Duration,
    ) -> Arc<Self> {
        info!(
            handlers = registry.len(),
            async_timeout_ms = async_timeout.as_millis() as u64,
            "Dispatch engine created"
        );
        Arc::new(Self {
            registry,
            scheduler,
            async_timeout,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn async_timeout(&self) -> Duration {
        self.async_timeout
    }

    /// Outer dispatch: run the handler registered for the exchange's current path.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the exchange is already past its first dispatch.
    /// `NotFound` when no handler is registered, or the handler's own error;
    /// in both of those cases the exchange has already been completed with a
    /// failure status.
    pub fn dispatch(self: &Arc<Self>, exchange: &Arc<Exchange>) -> Result<()> {
        let state = exchange.state();
        if state != ContinuationState::Idle || exchange.cycle() != 0 || exchange.has_started() {
            return Err(ContinuationError::illegal("dispatch", state));
        }
        let path = exchange.current_path();
        info!(
            exchange_id = %exchange.id(),
            method = %exchange.method(),
            path = %path,
            "Outer dispatch"
        );
        let handler = self.resolve(exchange, &path)?;
        self.invoke(exchange, handler.as_ref(), &path)
    }

    /// Nested dispatch to `target` (a path, optionally followed by `?query`).
    /// Runs the target handler on the calling thread.
    pub(crate) fn redispatch(
        self: &Arc<Self>,
        exchange: &Arc<Exchange>,
        cycle: u64,
        target: &str,
    ) -> Result<()> {
        let (path, query) = split_target(target);
        exchange.begin_redispatch(cycle)?;
        info!(exchange_id = %exchange.id(), path, "Nested dispatch");
        let handler = self.resolve(exchange, path)?;
        exchange.resume(path, query)?;
        self.invoke(exchange, handler.as_ref(), path)
    }

    /// Hand a task for `cycle` to the scheduler; a refusal completes the exchange.
    pub(crate) fn submit(
        self: &Arc<Self>,
        exchange: &Arc<Exchange>,
        cycle: u64,
        task: Task,
    ) -> Result<()> {
        let handle = AsyncHandle::bound(Arc::clone(self), Arc::clone(exchange), cycle);
        if let Err(e) = self.scheduler.submit(WorkUnit::new(handle, task)) {
            error!(exchange_id = %exchange.id(), error = %e, "Task rejected by scheduler");
            exchange.force_complete(e.status(), "task could not be scheduled");
            return Err(e);
        }
        debug!(exchange_id = %exchange.id(), "Task submitted");
        Ok(())
    }

    fn resolve(&self, exchange: &Exchange, path: &str) -> Result<Arc<dyn Handler>> {
        match self.registry.lookup(path) {
            Some(handler) => Ok(handler),
            None => {
                let err = ContinuationError::NotFound {
                    path: path.to_string(),
                };
                warn!(exchange_id = %exchange.id(), path, "No handler registered");
                exchange.force_complete(err.status(), "no handler registered");
                Err(err)
            }
        }
    }

    fn invoke(self: &Arc<Self>, exchange: &Arc<Exchange>, handler: &dyn Handler, path: &str) -> Result<()> {
        let ctx = HandlerContext::new(Arc::clone(self), Arc::clone(exchange));
        let started = Instant::now();

        let result = match catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx))) {
            Ok(result) => result,
            Err(panic) => Err(ContinuationError::HandlerFailure {
                path: path.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        };
        let elapsed_us = started.elapsed().as_micros() as u64;

        if let Err(e) = result {
            error!(
                exchange_id = %exchange.id(),
                path,
                elapsed_us,
                error = %e,
                "Handler failed"
            );
            exchange.force_complete(e.status(), "handler failed");
            return Err(e);
        }
        debug!(exchange_id = %exchange.id(), path, elapsed_us, "Handler returned");

        let (outcome, released) = exchange.handler_returned()?;
        match outcome {
            HandlerOutcome::Suspended { generation } => {
                self.arm_deadline(exchange, generation);
                for task in released {
                    self.submit(exchange, ctx.cycle, task)?;
                }
                Ok(())
            }
            HandlerOutcome::Synchronous => match exchange.complete() {
                // a completion from another thread got there first
                Err(e) if e.is_illegal_state() => Ok(()),
                other => other,
            },
            HandlerOutcome::Finished => Ok(()),
        }
    }

    fn arm_deadline(&self, exchange: &Arc<Exchange>, generation: u64) {
        let weak = Arc::downgrade(exchange);
        let timer = self.scheduler.schedule_after(
            self.async_timeout,
            Box::new(move || {
                if let Some(exchange) = weak.upgrade() {
                    exchange.expire(generation, EXPIRED_STATUS);
                }
            }),
        );
        exchange.arm_deadline(generation, timer);
    }
}

/// Split a dispatch target into path and optional query string.
///
/// ```rust
/// use continuum::dispatcher::split_target;
///
/// assert_eq!(split_target("/p?a=1"), ("/p", Some("a=1")));
/// assert_eq!(split_target("/p"), ("/p", None));
/// ```
#[must_use]
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}
