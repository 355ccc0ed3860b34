//! # continuum
//!
//! **continuum** is a request-continuation and dispatch engine: a handler can
//! suspend processing of a request, let its worker go, and have a scheduled
//! task or an internal redispatch resume and finish the exchange later.
//!
//! ## Architecture
//!
//! - **[`continuation`]** - The pure state machine (`IDLE`, `SUSPENDING`,
//!   `SUSPENDED`, `REDISPATCHING`, `COMPLETING`, `COMPLETED`, `EXPIRED`)
//! - **[`exchange`]** - One request/response cycle: current path, origin
//!   snapshot, attributes, response sink, all behind one per-exchange lock
//! - **[`registry`]** - Exact-match path to handler mapping
//! - **[`dispatcher`]** - Outer and nested dispatch, auto-completion, deadlines
//! - **[`async_handle`]** - The capability handlers use to `start`, `submit`,
//!   `dispatch` and `complete`
//! - **[`scheduler`]** - The scheduling contract plus a deterministic
//!   [`ManualScheduler`](scheduler::ManualScheduler)
//! - **[`worker_pool`]** - A `may` coroutine pool implementing the contract
//! - **[`server`]** - In-process connector: parse, dispatch, wait, render
//! - **[`runtime_config`]** / **[`telemetry`]** - Configuration and logging
//!
//! ### Suspend and redispatch
//!
//! ```mermaid
//! sequenceDiagram
//!     participant C as LocalConnector
//!     participant D as DispatchEngine
//!     participant H as Handler (/servletPath)
//!     participant S as Scheduler
//!     participant H2 as Handler (/servletPath2)
//!
//!     C->>D: dispatch(exchange)
//!     D->>H: handle(ctx)
//!     H->>H: start_with(task)  [IDLE -> SUSPENDING, task deferred]
//!     H-->>D: return
//!     D->>D: SUSPENDING -> SUSPENDED, arm deadline
//!     D->>S: submit(task)
//!     C->>C: wait_completed()
//!     S->>D: task: dispatch("/servletPath2")
//!     D->>D: snapshot origin, SUSPENDED -> REDISPATCHING -> IDLE
//!     D->>H2: handle(ctx)
//!     H2-->>D: start_with(report), return
//!     S->>S: report: write lines, complete()
//!     S-->>C: COMPLETED
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use continuum::dispatcher::{DispatchEngine, HandlerContext};
//! use continuum::exchange::{Exchange, RequestHead};
//! use continuum::registry::HandlerRegistry;
//! use continuum::scheduler::{ManualScheduler, Scheduler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("/work", |ctx: &HandlerContext| {
//!     ctx.response().write_line("accepted")?;
//!     ctx.async_handle().start_with(|handle| {
//!         handle.response().write_line("finished")?;
//!         handle.complete()
//!     })
//! });
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let engine = DispatchEngine::with_timeout(
//!     registry,
//!     Arc::clone(&scheduler) as Arc<dyn Scheduler>,
//!     Duration::from_secs(30),
//! );
//!
//! let exchange = Exchange::new(RequestHead::get("/work"), "");
//! engine.dispatch(&exchange).unwrap();
//! scheduler.run_pending();
//!
//! assert!(exchange.is_completed());
//! assert_eq!(exchange.sink().lines(), vec!["accepted", "finished"]);
//! ```
//!
//! ## Ordering
//!
//! Everything a handler writes before it returns precedes anything its tasks
//! write: tasks submitted while the exchange is `SUSPENDING` are held on the
//! exchange and only reach the scheduler once the handler has returned.
//!
//! ## Binary
//!
//! ```bash
//! continuum scenarios
//! continuum request --context-path /foo "GET /foo/servletPath?dispatch=true HTTP/1.1"
//! ```

pub mod async_handle;
pub mod cli;
pub mod continuation;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod exchange;
pub mod ids;
pub mod registry;
pub mod runtime_config;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod worker_pool;

pub use async_handle::AsyncHandle;
pub use continuation::ContinuationState;
pub use dispatcher::{DispatchEngine, HandlerContext};
pub use error::{ContinuationError, Result};
pub use exchange::{Exchange, RequestHead};
pub use registry::{Handler, HandlerRegistry};
pub use runtime_config::EngineConfig;
pub use server::LocalConnector;
