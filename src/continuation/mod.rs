//! # Continuation Module
//!
//! The continuation state machine governs which thread may touch an exchange and
//! which protocol calls are legal at any instant.
//!
//! ## States
//!
//! ```text
//!            start()            handler returns
//!   IDLE ─────────────▶ SUSPENDING ─────────────▶ SUSPENDED ──── deadline ───▶ EXPIRED
//!    ▲                                              │                           │
//!    │ nested dispatch                   dispatch() │                           │
//!    └────────────── REDISPATCHING ◀────────────────┘                           │
//!                                                                               ▼
//!   any non-final state ── complete() ──▶ COMPLETING ──── flushed ────────▶ COMPLETED
//! ```
//!
//! `EXPIRED` is the only server-initiated transition; it is immediately followed
//! by a forced `COMPLETED` with a timeout status.
//!
//! [`Continuation`] is a plain value with no locking of its own. The owning
//! [`Exchange`](crate::exchange::Exchange) keeps it behind its single guard, so
//! every transition here happens under that lock.

mod core;

pub use self::core::{Continuation, ContinuationState, HandlerOutcome};
