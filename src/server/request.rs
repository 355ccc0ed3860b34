use crate::error::{ContinuationError, Result};
use crate::exchange::HeaderVec;
use http::{Method, Version};
use std::sync::Arc;
use tracing::debug;

/// Request line and headers of a raw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query_string: Option<String>,
    pub version: Version,
    pub headers: HeaderVec,
}

impl ParsedRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn malformed(reason: impl Into<String>) -> ContinuationError {
    ContinuationError::MalformedRequest {
        reason: reason.into(),
    }
}

fn parse_version(token: Option<&str>) -> Result<Version> {
    match token {
        None | Some("HTTP/1.1") => Ok(Version::HTTP_11),
        Some("HTTP/1.0") => Ok(Version::HTTP_10),
        Some(other) => Err(malformed(format!("unsupported version {other}"))),
    }
}

/// Parse a request line and headers. Anything after the blank line is ignored.
///
/// ```rust
/// use continuum::server::parse_request;
///
/// let req = parse_request("GET /servletPath?dispatch=true HTTP/1.1\r\nHost: tester\r\n\r\n").unwrap();
/// assert_eq!(req.path, "/servletPath");
/// assert_eq!(req.query_string.as_deref(), Some("dispatch=true"));
/// assert_eq!(req.header("host"), Some("tester"));
/// ```
pub fn parse_request(raw: &str) -> Result<ParsedRequest> {
    let mut lines = raw.lines().map(|l| l.trim_end_matches('\r'));
    let request_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| malformed("empty request"))?;

    let mut parts = request_line.split_whitespace();
    let method_token = parts.next().ok_or_else(|| malformed("missing method"))?;
    let method = Method::from_bytes(method_token.as_bytes())
        .map_err(|_| malformed(format!("invalid method {method_token}")))?;
    let target = parts.next().ok_or_else(|| malformed("missing request target"))?;
    if !target.starts_with('/') {
        return Err(malformed(format!("request target must be absolute: {target}")));
    }
    let version = parse_version(parts.next())?;
    if parts.next().is_some() {
        return Err(malformed("trailing data on request line"));
    }

    let (path, query_string) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let mut headers = HeaderVec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("invalid header line {line}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed("empty header name"));
        }
        headers.push((Arc::from(name.to_ascii_lowercase()), value.trim().to_string()));
    }

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        "Parsed request"
    );

    Ok(ParsedRequest {
        method,
        path,
        query_string,
        version,
        headers,
    })
}
