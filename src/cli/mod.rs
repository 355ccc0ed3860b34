//! # CLI Module
//!
//! Command-line front end for the `continuum` binary. Requests are pushed
//! through a [`LocalConnector`](crate::server::LocalConnector) wired to the demo
//! handlers in [`echo`](crate::echo) and a coroutine worker pool.
//!
//! ## Commands
//!
//! ### `request`
//!
//! Run one request and print the rendered response:
//!
//! ```bash
//! continuum request --context-path /foo "GET /foo/servletPath?dispatch=true HTTP/1.1"
//! ```
//!
//! Options:
//! - `--context-path <PATH>` - where the demo context is mounted (default: root)
//! - `--header <NAME: VALUE>` - extra request header, repeatable
//! - `--config <FILE>` - YAML engine configuration (default: environment)
//!
//! ### `scenarios`
//!
//! Run the built-in simple, dispatch and context-path scenarios:
//!
//! ```bash
//! continuum scenarios
//! ```

mod commands;


pub use commands::{run, run_cli, Cli, Commands};
