#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::engines::pooled;
use continuum::exchange::RequestHead;
use continuum::{ContinuationError, Exchange, HandlerContext, HandlerRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);
const LONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll `check` until it holds or `WAIT` elapses.
fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn test_handler_output_always_precedes_task_output() {
    let mut registry = HandlerRegistry::new();
    registry.register("/order", |ctx: &HandlerContext| {
        ctx.response().write_line("h1")?;
        ctx.async_handle().start_with(|h| {
            h.response().write_line("t1")?;
            h.complete()
        })?;
        // give an eager worker every chance to run the task early
        std::thread::sleep(Duration::from_millis(2));
        ctx.response().write_line("h2")
    });
    let (engine, _pool) = pooled(registry, 4, LONG_TIMEOUT);

    for _ in 0..50 {
        let exchange = Exchange::new(RequestHead::get("/order"), "");
        engine.dispatch(&exchange).unwrap();
        assert!(exchange.wait_completed(WAIT));
        assert_eq!(exchange.sink().lines(), vec!["h1", "h2", "t1"]);
    }
}

#[test]
fn test_nested_dispatch_runs_on_calling_thread() {
    let threads: Arc<Mutex<Vec<ThreadId>>> = Arc::default();
    let mut registry = HandlerRegistry::new();
    let t = Arc::clone(&threads);
    registry.register("/a", move |ctx: &HandlerContext| {
        let t = Arc::clone(&t);
        ctx.async_handle().start_with(move |h| {
            t.lock().push(std::thread::current().id());
            h.dispatch("/b")
        })
    });
    let t = Arc::clone(&threads);
    registry.register("/b", move |_: &HandlerContext| {
        t.lock().push(std::thread::current().id());
        Ok(())
    });
    let (engine, _pool) = pooled(registry, 2, LONG_TIMEOUT);

    let exchange = Exchange::new(RequestHead::get("/a"), "");
    engine.dispatch(&exchange).unwrap();
    assert!(exchange.wait_completed(WAIT));
    assert_eq!(exchange.status(), 200);

    let threads = threads.lock();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0], threads[1]);
}

#[test]
fn test_task_panic_does_not_kill_workers() {
    let mut registry = HandlerRegistry::new();
    registry.register("/panic", |ctx: &HandlerContext| {
        ctx.async_handle()
            .start_with(|_| -> continuum::Result<()> { panic!("worker task blew up") })
    });
    registry.register("/ok", |ctx: &HandlerContext| {
        ctx.async_handle().start_with(|h| h.complete())
    });
    let (engine, pool) = pooled(registry, 1, LONG_TIMEOUT);

    let failed = Exchange::new(RequestHead::get("/panic"), "");
    engine.dispatch(&failed).unwrap();
    assert!(failed.wait_completed(WAIT));
    assert_eq!(failed.status(), 500);

    // the single worker is still alive
    let ok = Exchange::new(RequestHead::get("/ok"), "");
    engine.dispatch(&ok).unwrap();
    assert!(ok.wait_completed(WAIT));
    assert_eq!(ok.status(), 200);

    let metrics = Arc::clone(pool.metrics());
    assert!(eventually(|| metrics.get_failed_count() == 1
        && metrics.get_completed_count() == 1));
    assert_eq!(metrics.get_submitted_count(), 2);
}

#[test]
fn test_suspension_expires_on_real_timer() {
    let mut registry = HandlerRegistry::new();
    registry.register("/forgotten", |ctx: &HandlerContext| {
        ctx.start_async().map(|_| ())
    });
    let (engine, pool) = pooled(registry, 2, Duration::from_millis(50));

    let exchange = Exchange::new(RequestHead::get("/forgotten"), "");
    engine.dispatch(&exchange).unwrap();
    assert!(exchange.wait_completed(WAIT));
    assert_eq!(exchange.status(), 500);
    let metrics = Arc::clone(pool.metrics());
    assert!(eventually(|| metrics.get_timers_fired() == 1));
}

#[test]
fn test_completed_exchange_timer_never_fires() {
    let mut registry = HandlerRegistry::new();
    registry.register("/quick", |ctx: &HandlerContext| {
        ctx.async_handle().start_with(|h| h.complete())
    });
    let (engine, pool) = pooled(registry, 2, Duration::from_millis(30));

    let exchange = Exchange::new(RequestHead::get("/quick"), "");
    engine.dispatch(&exchange).unwrap();
    assert!(exchange.wait_completed(WAIT));
    assert_eq!(exchange.status(), 200);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(pool.metrics().get_timers_fired(), 0);
    assert_eq!(exchange.status(), 200);
}

#[test]
fn test_completion_releases_deadline_coroutine() {
    let mut registry = HandlerRegistry::new();
    registry.register("/quick", |ctx: &HandlerContext| {
        ctx.async_handle().start_with(|h| h.complete())
    });
    let (engine, pool) = pooled(registry, 2, LONG_TIMEOUT);
    let metrics = Arc::clone(pool.metrics());

    for _ in 0..8 {
        let exchange = Exchange::new(RequestHead::get("/quick"), "");
        engine.dispatch(&exchange).unwrap();
        assert!(exchange.wait_completed(WAIT));
    }
    // far sooner than the 30s deadline each sleeper was armed with
    assert!(eventually(|| metrics.get_active_timers() == 0));
    assert_eq!(metrics.get_timers_fired(), 0);
}

#[test]
fn test_stopped_pool_rejects_with_503() {
    let mut registry = HandlerRegistry::new();
    registry.register("/a", |ctx: &HandlerContext| {
        ctx.async_handle().start_with(|h| h.complete())
    });
    let (engine, pool) = pooled(registry, 1, LONG_TIMEOUT);
    pool.shutdown();

    let exchange = Exchange::new(RequestHead::get("/a"), "");
    let err = engine.dispatch(&exchange).unwrap_err();
    assert_eq!(err, ContinuationError::SchedulerUnavailable);
    assert!(exchange.is_completed());
    assert_eq!(exchange.status(), 503);
}

#[test]
fn test_concurrent_exchanges_complete_independently() {
    let mut registry = HandlerRegistry::new();
    registry.register("/echo", |ctx: &HandlerContext| {
        let id = ctx.request().parameter("id").unwrap_or_default();
        ctx.async_handle().start_with(move |h| {
            h.response().write_line(&id)?;
            h.complete()
        })
    });
    let (engine, _pool) = pooled(registry, 4, LONG_TIMEOUT);

    let clients: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let exchange =
                    Exchange::new(RequestHead::get("/echo").with_query(&format!("id={i}")), "");
                engine.dispatch(&exchange).unwrap();
                assert!(exchange.wait_completed(WAIT));
                exchange.sink().lines()
            })
        })
        .collect();

    for (i, client) in clients.into_iter().enumerate() {
        assert_eq!(client.join().unwrap(), vec![i.to_string()]);
    }
}
