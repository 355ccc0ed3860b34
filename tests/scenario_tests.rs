#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::runtime::setup_may_runtime;
use continuum::echo::demo_registry;
use continuum::server::{ConnectionDirective, LocalConnector};
use continuum::{DispatchEngine, EngineConfig};
use std::sync::Arc;

fn connector(context_path: &str) -> LocalConnector {
    setup_may_runtime();
    let config = EngineConfig {
        workers: 2,
        stack_size: 0x8000,
        response_timeout_ms: 5_000,
        ..EngineConfig::default()
    };
    let pool = Arc::new(continuum::worker_pool::WorkerPool::from_engine_config(&config));
    let engine = DispatchEngine::new(demo_registry(), pool, &config);
    LocalConnector::new(engine, context_path, &config)
}

fn request(target: &str) -> String {
    format!(
        "GET {target} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nConnection: close\r\n\r\n"
    )
}

/// Status line, the two headers and the blank line, then the body lines.
fn split_response(text: &str) -> (Vec<&str>, Vec<&str>) {
    let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));
    let head: Vec<&str> = lines.by_ref().take(4).collect();
    let body: Vec<&str> = lines.filter(|l| !l.is_empty()).collect();
    (head, body)
}

#[test]
fn test_simple_async_context() {
    let response = connector("").get_response(&request("/servletPath"));
    let (head, body) = split_response(&response.text);

    assert_eq!(head, vec!["HTTP/1.1 200 OK", "Connection: close", "Server: continuum", ""]);
    assert_eq!(response.directive, ConnectionDirective::Close);
    assert_eq!(
        body,
        vec![
            "doGet:getServletPath:/servletPath",
            "doGet:async:getServletPath:/servletPath",
            "async:run:/servletPath",
        ]
    );
}

#[test]
fn test_dispatch_async_context() {
    let response = connector("").get_response(&request("/servletPath?dispatch=true"));
    let (head, body) = split_response(&response.text);

    assert_eq!(head[0], "HTTP/1.1 200 OK");
    assert_eq!(
        body,
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

#[test]
fn test_simple_with_context_async_context() {
    let response = connector("/foo").get_response(&request("/foo/servletPath"));
    let (head, body) = split_response(&response.text);

    assert_eq!(head[0], "HTTP/1.1 200 OK");
    assert_eq!(
        body,
        vec![
            "doGet:getServletPath:/servletPath",
            "doGet:async:getServletPath:/servletPath",
            "async:run:/servletPath",
        ]
    );
}

#[test]
fn test_dispatch_with_context_async_context() {
    let response = connector("/foo").get_response(&request("/foo/servletPath?dispatch=true"));
    let (head, body) = split_response(&response.text);

    assert_eq!(head[0], "HTTP/1.1 200 OK");
    assert_eq!(
        body,
        vec![
            "doGet:getServletPath:/servletPath2",
            "doGet:async:getServletPath:/servletPath2",
            "async:run:/servletPath2",
            "async:run:attr:servletPath:/servletPath",
            "async:run:attr:pathInfo:null",
            "async:run:attr:queryString:dispatch=true",
            "async:run:attr:contextPath:/foo",
            "async:run:attr:requestURI:/foo/servletPath",
        ]
    );
}

#[test]
fn test_keep_alive_by_default() {
    let response = connector("").get_response("GET /servletPath HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, 200);
    assert_eq!(response.directive, ConnectionDirective::KeepAlive);
    assert!(response.text.contains("Connection: keep-alive\r\n"));
}

#[test]
fn test_scenarios_repeat_without_interference() {
    let connector = connector("");
    for _ in 0..20 {
        let response = connector.get_response(&request("/servletPath?dispatch=true"));
        assert_eq!(response.status, 200);
        assert_eq!(response.lines().len(), 8);
        assert_eq!(response.lines()[3], "async:run:attr:servletPath:/servletPath");
    }
}
