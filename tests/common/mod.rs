#![allow(dead_code)]

pub mod engines {
    use continuum::dispatcher::DispatchEngine;
    use continuum::registry::HandlerRegistry;
    use continuum::scheduler::{ManualScheduler, Scheduler};
    use continuum::worker_pool::{WorkerPool, WorkerPoolConfig};
    use std::sync::Arc;
    use std::time::Duration;

    /// Engine over a deterministic scheduler; nothing runs until the test says so.
    pub fn manual(
        registry: HandlerRegistry,
        async_timeout: Duration,
    ) -> (Arc<DispatchEngine>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = DispatchEngine::with_timeout(
            registry,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            async_timeout,
        );
        (engine, scheduler)
    }

    /// Engine over a real coroutine pool.
    pub fn pooled(
        registry: HandlerRegistry,
        workers: usize,
        async_timeout: Duration,
    ) -> (Arc<DispatchEngine>, Arc<WorkerPool>) {
        super::runtime::setup_may_runtime();
        let pool = Arc::new(WorkerPool::new("test", WorkerPoolConfig::new(workers, 0x8000)));
        let engine = DispatchEngine::with_timeout(
            registry,
            Arc::clone(&pool) as Arc<dyn Scheduler>,
            async_timeout,
        );
        (engine, pool)
    }
}

pub mod runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(2);
            may::config().set_stack_size(0x8000);
        });
    }
}
