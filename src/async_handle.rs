//! Handle through which handler and task code drives a suspended exchange.

use crate::dispatcher::DispatchEngine;
use crate::error::Result;
use crate::exchange::{Exchange, RequestView, ResponseView};
use std::fmt;
use std::sync::Arc;

/// Async handle for one exchange, bound to one dispatch cycle.
///
/// Cheap to clone; every clone drives the same exchange. Tasks receive a
/// handle for the cycle that was current when they were scheduled.
#[derive(Clone)]
pub struct AsyncHandle {
    engine: Arc<DispatchEngine>,
    exchange: Arc<Exchange>,
    cycle: u64,
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("exchange_id", &self.exchange.id())
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl AsyncHandle {
    pub(crate) fn bound(engine: Arc<DispatchEngine>, exchange: Arc<Exchange>, cycle: u64) -> Self {
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
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether this handle's cycle has been started.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.exchange.cycle() == self.cycle && self.exchange.has_started()
    }

    /// `IDLE → SUSPENDING`. Allowed once per dispatch cycle.
    pub fn start(&self) -> Result<()> {
        self.exchange.start(self.cycle)
    }

    /// Start and schedule `task` in one step. The task runs no earlier than the
    /// return of the handler that called this.
    pub fn start_with<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&AsyncHandle) -> Result<()> + Send + 'static,
    {
        self.start()?;
        self.submit(task)
    }

    /// Schedule `task` on the engine's scheduler.
    ///
    /// While the handler is still running the task is held back and released
    /// when it returns; once suspended it goes straight to the scheduler.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&AsyncHandle) -> Result<()> + Send + 'static,
    {
        match self.exchange.defer_or_release(self.cycle, Box::new(task))? {
            None => Ok(()),
            Some(task) => self.engine.submit(&self.exchange, self.cycle, task),
        }
    }

    /// Redispatch the suspended exchange to `target`, running its handler on
    /// the calling thread before returning. Fails if a later cycle owns the
    /// suspension.
    pub fn dispatch(&self, target: &str) -> Result<()> {
        self.engine.redispatch(&self.exchange, self.cycle, target)
    }

    /// Finish the exchange and signal the connector.
    pub fn complete(&self) -> Result<()> {
        self.exchange.complete()
    }

    #[must_use]
    pub fn request(&self) -> RequestView<'_> {
        RequestView::new(&self.exchange)
    }

    #[must_use]
    pub fn response(&self) -> ResponseView<'_> {
        ResponseView::new(&self.exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationState;
    use crate::dispatcher::HandlerContext;
    use crate::error::ContinuationError;
    use crate::exchange::RequestHead;
    use crate::registry::HandlerRegistry;
    use crate::scheduler::{ManualScheduler, Scheduler};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn engine(registry: HandlerRegistry) -> (Arc<DispatchEngine>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = DispatchEngine::with_timeout(
            registry,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            Duration::from_secs(30),
        );
        (engine, scheduler)
    }

    #[test]
    fn test_start_twice_in_one_cycle() {
        let seen = Arc::new(Mutex::new(None));
        let mut registry = HandlerRegistry::new();
        let s = Arc::clone(&seen);
        registry.register("/a", move |ctx: &HandlerContext| {
            let handle = ctx.async_handle();
            handle.start()?;
            *s.lock() = Some(handle.start());
            handle.submit(|h| h.complete())
        });
        let (engine, scheduler) = engine(registry);
        let exchange = Exchange::new(RequestHead::get("/a"), "");
        engine.dispatch(&exchange).unwrap();
        scheduler.run_pending();

        let second = seen.lock().take().unwrap();
        assert!(second.unwrap_err().is_illegal_state());
        assert!(exchange.is_completed());
    }

    #[test]
    fn test_submit_without_start_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("/a", |ctx: &HandlerContext| {
            let err = ctx.async_handle().submit(|_| Ok(())).unwrap_err();
            assert!(err.is_illegal_state());
            Ok(())
        });
        let (engine, scheduler) = engine(registry);
        let exchange = Exchange::new(RequestHead::get("/a"), "");
        engine.dispatch(&exchange).unwrap();
        assert_eq!(scheduler.pending(), 0);
        assert!(exchange.is_completed());
    }

    #[test]
    fn test_operations_after_completion_fail() {
        let mut registry = HandlerRegistry::new();
        registry.register("/a", |ctx: &HandlerContext| ctx.start_async().map(|_| ()));
        registry.register("/b", |_: &HandlerContext| Ok(()));
        let (engine, _) = engine(registry);
        let exchange = Exchange::new(RequestHead::get("/a"), "");
        engine.dispatch(&exchange).unwrap();

        let handle = AsyncHandle::bound(Arc::clone(&engine), Arc::clone(&exchange), exchange.cycle());
        handle.complete().unwrap();
        assert_eq!(exchange.state(), ContinuationState::Completed);

        assert!(handle.complete().unwrap_err().is_illegal_state());
        assert!(handle.dispatch("/b").unwrap_err().is_illegal_state());
        assert!(handle.start().unwrap_err().is_illegal_state());
        assert!(handle.submit(|_| Ok(())).unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_stale_handle_cannot_start_new_cycle() {
        let stale = Arc::new(Mutex::new(None::<AsyncHandle>));
        let mut registry = HandlerRegistry::new();
        let s = Arc::clone(&stale);
        registry.register("/first", move |ctx: &HandlerContext| {
            let handle = ctx.start_async()?;
            *s.lock() = Some(handle.clone());
            handle.submit(|h| h.dispatch("/second"))
        });
        let s = Arc::clone(&stale);
        registry.register("/second", move |_: &HandlerContext| {
            let old = s.lock().clone().ok_or(ContinuationError::Io {
                reason: "missing handle".into(),
            })?;
            assert!(old.start().unwrap_err().is_illegal_state());
            Ok(())
        });
        let (engine, scheduler) = engine(registry);
        let exchange = Exchange::new(RequestHead::get("/first"), "");
        engine.dispatch(&exchange).unwrap();
        scheduler.run_pending();
        assert!(exchange.is_completed());
        assert_eq!(exchange.status(), 200);
        assert_eq!(exchange.cycle(), 1);
    }

    #[test]
    fn test_stale_handle_cannot_redispatch_later_suspension() {
        let stale_result = Arc::new(Mutex::new(None));
        let mut registry = HandlerRegistry::new();
        let r = Arc::clone(&stale_result);
        registry.register("/a", move |ctx: &HandlerContext| {
            let r = Arc::clone(&r);
            ctx.async_handle().start_with(move |h| {
                h.dispatch("/b")?;
                *r.lock() = Some(h.dispatch("/c"));
                Ok(())
            })
        });
        registry.register("/b", |ctx: &HandlerContext| {
            ctx.async_handle().start_with(|h| {
                h.response().write_line("b ran")?;
                h.complete()
            })
        });
        registry.register("/c", |ctx: &HandlerContext| ctx.response().write_line("c ran"));
        let (engine, scheduler) = engine(registry);
        let exchange = Exchange::new(RequestHead::get("/a"), "");
        engine.dispatch(&exchange).unwrap();
        scheduler.run_pending();

        let stale = stale_result.lock().take().unwrap();
        assert!(stale.unwrap_err().is_illegal_state());
        assert!(exchange.is_completed());
        assert_eq!(exchange.status(), 200);
        assert_eq!(exchange.current_path(), "/b");
        assert_eq!(exchange.sink().lines(), vec!["b ran"]);
    }
}
