use http::Version;

/// Reason phrase for the statuses this engine produces.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// What the connector does with the connection after the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDirective {
    Close,
    KeepAlive,
}

impl ConnectionDirective {
    /// HTTP/1.1 keeps the connection unless told to close; HTTP/1.0 closes
    /// unless asked to keep it.
    #[must_use]
    pub fn decide(version: Version, connection: Option<&str>) -> Self {
        let has = |token: &str| {
            connection.is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        };
        if has("close") {
            Self::Close
        } else if version == Version::HTTP_10 && !has("keep-alive") {
            Self::Close
        } else {
            Self::KeepAlive
        }
    }

    #[must_use]
    pub fn as_header_value(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::KeepAlive => "keep-alive",
        }
    }
}

/// Render a complete response: status line, `Connection` and `Server`
/// headers, blank line, body.
#[must_use]
pub fn render_response(
    status: u16,
    directive: ConnectionDirective,
    server_name: &str,
    body: &str,
) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str("HTTP/1.1 ");
    out.push_str(&status.to_string());
    out.push(' ');
    out.push_str(status_reason(status));
    out.push_str("\r\nConnection: ");
    out.push_str(directive.as_header_value());
    out.push_str("\r\nServer: ");
    out.push_str(server_name);
    out.push_str("\r\n\r\n");
    out.push_str(body);
    out
}
