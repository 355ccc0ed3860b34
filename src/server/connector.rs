use super::request::parse_request;
use super::response::{render_response, ConnectionDirective};
use crate::dispatcher::DispatchEngine;
use crate::exchange::{normalize_context_path, Exchange, RequestHead};
use crate::ids::ExchangeId;
use crate::runtime_config::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status when the exchange fails to complete within the response timeout.
const RESPONSE_TIMEOUT_STATUS: u16 = 503;

/// Result of pushing one raw request through the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorResponse {
    /// `None` when the request never became an exchange
    pub exchange_id: Option<ExchangeId>,
    pub status: u16,
    pub directive: ConnectionDirective,
    pub body: String,
    /// Full rendered response
    pub text: String,
}

impl ConnectorResponse {
    /// Body split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.body.lines().collect()
    }
}

/// In-process connector for one context.
pub struct LocalConnector {
    engine: Arc<DispatchEngine>,
    context_path: String,
    server_name: String,
    response_timeout: Duration,
}

impl std::fmt::Debug for LocalConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConnector")
            .field("context_path", &self.context_path)
            .field("server_name", &self.server_name)
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

impl LocalConnector {
    /// Connector for the context mounted at `context_path` (`""` or `"/"` for root).
    #[must_use]
    pub fn new(engine: Arc<DispatchEngine>, context_path: &str, config: &EngineConfig) -> Self {
        let context_path = normalize_context_path(context_path);
        info!(
            context_path = %context_path,
            server_name = %config.server_name,
            "Local connector ready"
        );
        Self {
            engine,
            context_path,
            server_name: config.server_name.clone(),
            response_timeout: config.response_timeout(),
        }
    }

    #[must_use]
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Path inside this context, or `None` if `path` lies outside it.
    fn strip_context<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.context_path.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.context_path.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Run one raw request to completion and render the response.
    ///
    /// Never fails: unparseable requests become 400, requests outside the
    /// context become 404, and exchanges that miss the response timeout are
    /// forced to 503.
    pub fn get_response(&self, raw: &str) -> ConnectorResponse {
        let request = match parse_request(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed request");
                return self.respond(None, e.status(), ConnectionDirective::Close, String::new());
            }
        };
        let directive = ConnectionDirective::decide(request.version, request.header("connection"));

        let Some(servlet_path) = self.strip_context(&request.path) else {
            debug!(path = %request.path, context_path = %self.context_path, "Request outside context");
            return self.respond(None, 404, directive, String::new());
        };

        let head = RequestHead {
            method: request.method,
            path: servlet_path.to_string(),
            query_string: request.query_string,
            headers: request.headers,
        };
        let exchange = Exchange::new(head, &self.context_path);

        if let Err(e) = self.engine.dispatch(&exchange) {
            // the engine has already completed the exchange with the error status
            debug!(exchange_id = %exchange.id(), error = %e, "Outer dispatch failed");
        }

        if !exchange.wait_completed(self.response_timeout) {
            warn!(
                exchange_id = %exchange.id(),
                timeout_ms = self.response_timeout.as_millis() as u64,
                "Exchange did not complete in time"
            );
            exchange.force_complete(RESPONSE_TIMEOUT_STATUS, "response timeout");
        }

        let body = exchange.sink().drain();
        self.respond(Some(exchange.id()), exchange.status(), directive, body)
    }

    fn respond(
        &self,
        exchange_id: Option<ExchangeId>,
        status: u16,
        directive: ConnectionDirective,
        body: String,
    ) -> ConnectorResponse {
        let text = render_response(status, directive, &self.server_name, &body);
        ConnectorResponse {
            exchange_id,
            status,
            directive,
            body,
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HandlerContext;
    use crate::registry::HandlerRegistry;
    use crate::scheduler::{ManualScheduler, Scheduler};

    fn connector(context_path: &str) -> LocalConnector {
        let mut registry = HandlerRegistry::new();
        registry.register("/hello", |ctx: &HandlerContext| {
            let request = ctx.request();
            ctx.response()
                .write_line(&format!("{}|{}", request.context_path(), request.servlet_path()))
        });
        let config = EngineConfig {
            response_timeout_ms: 50,
            ..EngineConfig::default()
        };
        let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new());
        let engine = DispatchEngine::new(registry, scheduler, &config);
        LocalConnector::new(engine, context_path, &config)
    }

    #[test]
    fn test_root_context() {
        let response = connector("").get_response("GET /hello HTTP/1.1\r\n\r\n");
        assert_eq!(response.status, 200);
        assert_eq!(response.lines(), vec!["|/hello"]);
        assert_eq!(response.directive, ConnectionDirective::KeepAlive);
        assert!(response.text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.exchange_id.is_some());
    }

    #[test]
    fn test_context_is_stripped() {
        let response = connector("/foo/").get_response("GET /foo/hello HTTP/1.1\r\n\r\n");
        assert_eq!(response.lines(), vec!["/foo|/hello"]);
    }

    #[test]
    fn test_context_without_leading_slash() {
        let connector = connector("foo");
        assert_eq!(connector.context_path(), "/foo");
        let response = connector.get_response("GET /foo/hello HTTP/1.1\r\n\r\n");
        assert_eq!(response.status, 200);
        assert_eq!(response.lines(), vec!["/foo|/hello"]);
    }

    #[test]
    fn test_outside_context_is_not_dispatched() {
        let connector = connector("/foo");
        for raw in ["GET /hello HTTP/1.1\r\n\r\n", "GET /foobar/hello HTTP/1.1\r\n\r\n"] {
            let response = connector.get_response(raw);
            assert_eq!(response.status, 404);
            assert!(response.exchange_id.is_none());
        }
    }

    #[test]
    fn test_unregistered_path() {
        let response = connector("").get_response("GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert_eq!(response.status, 404);
        assert!(response.exchange_id.is_some());
        assert_eq!(response.directive, ConnectionDirective::Close);
    }

    #[test]
    fn test_malformed_request() {
        let response = connector("").get_response("NOT A REQUEST AT ALL\r\n\r\n");
        assert_eq!(response.status, 400);
        assert_eq!(response.directive, ConnectionDirective::Close);
    }
}
