//! # Server Module
//!
//! An in-process connector that feeds raw request text into the
//! [`DispatchEngine`](crate::dispatcher::DispatchEngine) and renders the
//! completed exchange back out.
//!
//! There is no socket handling here. [`LocalConnector`] is the seam where a real
//! network front end would sit: it parses the request head, strips the context
//! path, runs the outer dispatch, waits for `COMPLETED` and drains the response
//! sink.

mod connector;
pub mod request;
pub mod response;

pub use connector::{ConnectorResponse, LocalConnector};
pub use request::{parse_request, ParsedRequest};
pub use response::{render_response, status_reason, ConnectionDirective};
