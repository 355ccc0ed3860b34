//! Demo handlers that print which path they were reached through.
//!
//! `/servletPath` suspends and either reports from a task or, when the query
//! carries a `dispatch` parameter, redispatches to `/servletPath2`. The second
//! handler suspends again and its task also reports the origin attributes
//! captured at the first suspension.

use crate::async_handle::AsyncHandle;
use crate::dispatcher::HandlerContext;
use crate::error::Result;
use crate::exchange::{
    ORIGIN_CONTEXT_PATH, ORIGIN_PATH_INFO, ORIGIN_QUERY_STRING, ORIGIN_REQUEST_URI,
    ORIGIN_SERVLET_PATH,
};
use crate::registry::HandlerRegistry;

pub const PRIMARY_PATH: &str = "/servletPath";
pub const SECONDARY_PATH: &str = "/servletPath2";

/// Attribute labels as printed, paired with their keys.
const REPORTED_ATTRIBUTES: [(&str, &str); 5] = [
    ("servletPath", ORIGIN_SERVLET_PATH),
    ("pathInfo", ORIGIN_PATH_INFO),
    ("queryString", ORIGIN_QUERY_STRING),
    ("contextPath", ORIGIN_CONTEXT_PATH),
    ("requestURI", ORIGIN_REQUEST_URI),
];

/// Register both demo handlers.
pub fn register_demo_handlers(registry: &mut HandlerRegistry) {
    registry.register(PRIMARY_PATH, primary_handler);
    registry.register(SECONDARY_PATH, reporting_handler);
}

#[must_use]
pub fn demo_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_demo_handlers(&mut registry);
    registry
}

fn primary_handler(ctx: &HandlerContext) -> Result<()> {
    if ctx.request().parameter("dispatch").is_some() {
        return ctx
            .async_handle()
            .start_with(|handle| handle.dispatch(SECONDARY_PATH));
    }
    reporting_handler(ctx)
}

fn reporting_handler(ctx: &HandlerContext) -> Result<()> {
    let response = ctx.response();
    response.write_line(&format!(
        "doGet:getServletPath:{}",
        ctx.request().servlet_path()
    ))?;
    let handle = ctx.start_async()?;
    response.write_line(&format!(
        "doGet:async:getServletPath:{}",
        handle.request().servlet_path()
    ))?;
    handle.submit(report)
}

fn report(handle: &AsyncHandle) -> Result<()> {
    let request = handle.request();
    let response = handle.response();
    response.write_line(&format!("async:run:{}", request.servlet_path()))?;
    if request.attribute(ORIGIN_SERVLET_PATH).is_some() {
        for (label, key) in REPORTED_ATTRIBUTES {
            response.write_line(&format!(
                "async:run:attr:{label}:{}",
                request.attribute_text(key)
            ))?;
        }
    }
    handle.complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchEngine;
    use crate::exchange::{Exchange, RequestHead};
    use crate::scheduler::{ManualScheduler, Scheduler};
    use std::sync::Arc;
    use std::time::Duration;

    fn run(head: RequestHead, context_path: &str) -> Vec<String> {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = DispatchEngine::with_timeout(
            demo_registry(),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            Duration::from_secs(30),
        );
        let exchange = Exchange::new(head, context_path);
        engine.dispatch(&exchange).unwrap();
        scheduler.run_pending();
        assert!(exchange.is_completed());
        exchange.sink().lines()
    }

    #[test]
    fn test_simple() {
        assert_eq!(
            run(RequestHead::get(PRIMARY_PATH), ""),
            vec![
                "doGet:getServletPath:/servletPath",
                "doGet:async:getServletPath:/servletPath",
                "async:run:/servletPath",
            ]
        );
    }

    #[test]
    fn test_dispatch_reports_origin() {
        let lines = run(
            RequestHead::get(PRIMARY_PATH).with_query("dispatch=true"),
            "",
        );
        assert_eq!(
            lines,
            vec![
                "doGet:getServletPath:/servletPath2",
                "doGet:async:getServletPath:/servletPath2",
                "async:run:/servletPath2",
                "async:run:attr:servletPath:/servletPath",
                "async:run:attr:pathInfo:null",
                "async:run:attr:queryString:dispatch=true",
                "async:run:attr:contextPath:",
                "async:run:attr:requestURI:/servletPath",
            ]
        );
    }
}
