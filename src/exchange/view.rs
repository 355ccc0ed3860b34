use super::core::Exchange;
use super::snapshot::OriginSnapshot;
use crate::error::Result;
use http::Method;
use serde_json::Value;
use tracing::error;

/// Request-side view of an exchange, as handler and task code sees it.
///
/// Path accessors report the *current* dispatch target: after a redispatch,
/// [`servlet_path`](Self::servlet_path) returns the new path while the origin
/// attributes keep reporting where the exchange first suspended.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    exchange: &'a Exchange,
}

impl<'a> RequestView<'a> {
    #[must_use]
    pub fn new(exchange: &'a Exchange) -> Self {
        Self { exchange }
    }

    #[must_use]
    pub fn method(&self) -> &'a Method {
        self.exchange.method()
    }

    #[must_use]
    pub fn servlet_path(&self) -> String {
        self.exchange.current_path()
    }

    #[must_use]
    pub fn path_info(&self) -> Option<String> {
        self.exchange.path_info()
    }

    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        self.exchange.query_string()
    }

    #[must_use]
    pub fn context_path(&self) -> &'a str {
        self.exchange.context_path()
    }

    #[must_use]
    pub fn request_uri(&self) -> String {
        self.exchange.request_uri()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.exchange.header(name)
    }

    /// First value of a form-urlencoded query parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<String> {
        let query = self.exchange.query_string()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.exchange.attribute(key)
    }

    /// Attribute rendered as text; missing and null values render as `null`.
    #[must_use]
    pub fn attribute_text(&self, key: &str) -> String {
        match self.exchange.attribute(key) {
            None | Some(Value::Null) => "null".to_string(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        }
    }

    #[must_use]
    pub fn origin(&self) -> Option<OriginSnapshot> {
        self.exchange.origin_snapshot()
    }
}

/// Response-side view of an exchange.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    exchange: &'a Exchange,
}

impl<'a> ResponseView<'a> {
    #[must_use]
    pub fn new(exchange: &'a Exchange) -> Self {
        Self { exchange }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.exchange.status()
    }

    pub fn set_status(&self, status: u16) {
        self.exchange.set_status(status);
    }

    /// Append to the response. A failed write forces the exchange to complete
    /// with a failure status before the error is returned.
    pub fn write(&self, text: &str) -> Result<()> {
        if let Err(e) = self.exchange.sink().write(text) {
            error!(exchange_id = %self.exchange.id(), error = %e, "Response write failed");
            self.exchange.force_complete(e.status(), "response write failed");
            return Err(e);
        }
        Ok(())
    }

    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut text = String::with_capacity(line.len() + 1);
        text.push_str(line);
        text.push('\n');
        self.write(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RequestHead;

    #[test]
    fn test_parameter_decoding() {
        let exchange = Exchange::new(
            RequestHead::get("/p").with_query("dispatch=true&name=a%20b&name=c"),
            "",
        );
        let request = RequestView::new(&exchange);
        assert_eq!(request.parameter("dispatch").as_deref(), Some("true"));
        assert_eq!(request.parameter("name").as_deref(), Some("a b"));
        assert_eq!(request.parameter("missing"), None);
    }

    #[test]
    fn test_parameter_without_query() {
        let exchange = Exchange::new(RequestHead::get("/p"), "");
        assert_eq!(RequestView::new(&exchange).parameter("dispatch"), None);
    }

    #[test]
    fn test_attribute_text() {
        let exchange = Exchange::new(RequestHead::get("/p"), "");
        exchange.set_attribute("n", Value::from(3));
        exchange.set_attribute("null", Value::Null);
        exchange.set_attribute("s", Value::String("x".into()));
        let request = RequestView::new(&exchange);
        assert_eq!(request.attribute_text("n"), "3");
        assert_eq!(request.attribute_text("null"), "null");
        assert_eq!(request.attribute_text("s"), "x");
        assert_eq!(request.attribute_text("absent"), "null");
    }

    #[test]
    fn test_write_after_completion_fails_without_changing_status() {
        let exchange = Exchange::new(RequestHead::get("/p"), "");
        let response = ResponseView::new(&exchange);
        response.write_line("one").unwrap();
        exchange.complete().unwrap();
        assert!(response.write_line("two").is_err());
        assert_eq!(response.status(), 200);
        assert_eq!(exchange.sink().lines(), vec!["one"]);
    }

    #[test]
    fn test_broken_connection_forces_failure_completion() {
        let exchange = Exchange::new(RequestHead::get("/p"), "");
        exchange.sink().break_connection();
        let err = ResponseView::new(&exchange).write("x").unwrap_err();
        assert_eq!(err.status(), 500);
        assert!(exchange.is_completed());
        assert_eq!(exchange.status(), 500);
    }
}
