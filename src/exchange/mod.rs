//! # Exchange Module
//!
//! An [`Exchange`] is the mutable unit of state for one request/response cycle.
//! It is shared as `Arc<Exchange>` between the connector, the dispatcher, the
//! handler currently running and any scheduled task, but only one of them
//! logically owns it at a time. Ownership moves at the protocol boundaries the
//! [`continuation`](crate::continuation) state machine defines.
//!
//! All state mutations (state tag, origin snapshot, attributes, status) happen
//! under one per-exchange guard. Response output goes to a separate
//! append-only [`ResponseSink`] whose writes are totally ordered as issued.
//!
//! Handler and task code never see the exchange's internals directly; they use
//! the [`RequestView`] and [`ResponseView`] borrowed from it.

mod core;
mod sink;
mod snapshot;
mod view;

pub use self::core::{
    normalize_context_path, Exchange, HeaderVec, RequestHead, MAX_INLINE_HEADERS,
};
pub use sink::ResponseSink;
pub use snapshot::{
    snapshot, OriginSnapshot, ORIGIN_ATTRIBUTE_KEYS, ORIGIN_CONTEXT_PATH, ORIGIN_PATH_INFO,
    ORIGIN_QUERY_STRING, ORIGIN_REQUEST_URI, ORIGIN_SERVLET_PATH,
};
pub use view::{RequestView, ResponseView};
