use serde::Serialize;
use serde_json::Value;

/// Attribute key exposing the servlet path active at first suspension.
pub const ORIGIN_SERVLET_PATH: &str = "origin-servlet-path";
/// Attribute key exposing the path info active at first suspension.
pub const ORIGIN_PATH_INFO: &str = "origin-path-info";
/// Attribute key exposing the query string active at first suspension.
pub const ORIGIN_QUERY_STRING: &str = "origin-query-string";
/// Attribute key exposing the owning context's path.
pub const ORIGIN_CONTEXT_PATH: &str = "origin-context-path";
/// Attribute key exposing the request URI active at first suspension.
pub const ORIGIN_REQUEST_URI: &str = "origin-request-uri";

/// All origin keys, in the order they are usually reported.
pub const ORIGIN_ATTRIBUTE_KEYS: [&str; 5] = [
    ORIGIN_SERVLET_PATH,
    ORIGIN_PATH_INFO,
    ORIGIN_QUERY_STRING,
    ORIGIN_CONTEXT_PATH,
    ORIGIN_REQUEST_URI,
];

/// Path metadata captured once, when the exchange is first redispatched out of
/// a suspension. Later redispatches never overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginSnapshot {
    pub servlet_path: String,
    pub path_info: Option<String>,
    pub query_string: Option<String>,
    pub context_path: String,
    pub request_uri: String,
}

impl OriginSnapshot {
    /// The snapshot as attribute entries. Absent values map to `Value::Null`.
    #[must_use]
    pub fn attributes(&self) -> [(&'static str, Value); 5] {
        let opt = |v: &Option<String>| v.clone().map_or(Value::Null, Value::String);
        [
            (ORIGIN_SERVLET_PATH, Value::String(self.servlet_path.clone())),
            (ORIGIN_PATH_INFO, opt(&self.path_info)),
            (ORIGIN_QUERY_STRING, opt(&self.query_string)),
            (ORIGIN_CONTEXT_PATH, Value::String(self.context_path.clone())),
            (ORIGIN_REQUEST_URI, Value::String(self.request_uri.clone())),
        ]
    }
}

/// Build the origin snapshot from the request path state.
///
/// The request URI is the context path, the servlet path and the path info
/// joined, without the query string.
#[must_use]
pub fn snapshot(
    context_path: &str,
    servlet_path: &str,
    path_info: Option<&str>,
    query_string: Option<&str>,
) -> OriginSnapshot {
    let mut request_uri =
        String::with_capacity(context_path.len() + servlet_path.len() + path_info.map_or(0, str::len));
    request_uri.push_str(context_path);
    request_uri.push_str(servlet_path);
    if let Some(info) = path_info {
        request_uri.push_str(info);
    }

    OriginSnapshot {
        servlet_path: servlet_path.to_string(),
        path_info: path_info.map(str::to_string),
        query_string: query_string.map(str::to_string),
        context_path: context_path.to_string(),
        request_uri,
    }
}
