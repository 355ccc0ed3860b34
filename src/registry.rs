//! Exact-match mapping from path to handler.

use crate::dispatcher::HandlerContext;
use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Anything that can process an exchange dispatched to a path.
///
/// Closures of the right shape implement this automatically:
///
/// ```rust
/// use continuum::registry::HandlerRegistry;
///
/// let mut registry = HandlerRegistry::new();
/// registry.register("/hello", |ctx: &continuum::dispatcher::HandlerContext| {
///     ctx.response().write_line("hello")
/// });
/// assert!(registry.lookup("/hello").is_some());
/// ```
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&HandlerContext) -> Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext) -> Result<()> {
        self(ctx)
    }
}

/// Path → handler, exact string match only.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, replacing any earlier registration.
    pub fn register<H>(&mut self, path: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.register_arc(path, Arc::new(handler));
    }

    pub fn register_arc(&mut self, path: &str, handler: Arc<dyn Handler>) {
        if self.handlers.insert(path.to_string(), handler).is_some() {
            warn!(path, "Replaced existing handler");
        } else {
            info!(path, total_handlers = self.handlers.len(), "Handler registered");
        }
    }

    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(path).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
