//! # Dispatcher Module
//!
//! The [`DispatchEngine`] resolves a path through the
//! [`HandlerRegistry`](crate::registry::HandlerRegistry) and invokes the handler
//! against an exchange, then reads the continuation state to decide what
//! happens next.
//!
//! ## Outer and nested dispatch
//!
//! The connector's call is the *outer* dispatch. A call to
//! [`AsyncHandle::dispatch`](crate::async_handle::AsyncHandle::dispatch) on a
//! suspended exchange performs a *nested* dispatch: the new handler runs
//! synchronously on whichever thread made that call.
//!
//! ## After the handler returns
//!
//! | State | Action |
//! |---|---|
//! | `SUSPENDING` | move to `SUSPENDED`, arm the deadline, release deferred tasks to the scheduler |
//! | `IDLE` | the handler never went async; complete the exchange |
//! | `COMPLETING`/`COMPLETED` | nothing |
//!
//! ## Error Handling
//!
//! - Unregistered path: the exchange completes with 404 and `NotFound` is returned
//! - Handler error or panic: the exchange completes with 500 and the error is returned
//! - Scheduler refuses work: the exchange completes with 503

mod core;

pub use self::core::{split_target, DispatchEngine, HandlerContext};
