//! Responses produced by service chains and the dispatch layer.
//!
//! # Responsibilities
//! - Build responses (status, headers, body)
//! - Serialize to HTTP/1.x wire format
//! - Generic error responses shared by the engine and the connection driver
//!
//! # Design Decisions
//! - `Content-Length` framing only; responses are fully buffered
//! - `Connection` and `Content-Length` are always written by the serializer,
//!   never taken from service-supplied headers

use axum::http::StatusCode;

use crate::http::request::HttpVersion;

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("vhost-server/", env!("CARGO_PKG_VERSION"));

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Answer to a HEAD request: headers describe the body but it is not sent.
    pub head_only: bool,
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            head_only: false,
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    /// Response with the canonical reason phrase as a text body.
    pub fn status_page(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        Self::text(status, format!("{} {}\n", status.as_u16(), reason))
    }

    /// Generic failure response for service errors and misconfigured chains.
    pub fn internal_error() -> Self {
        Self::status_page(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the status line, headers and body.
    pub fn to_bytes(&self, version: HttpVersion, keep_alive: bool) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}\r\n",
            version.response_version(),
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        );
        head.push_str(&format!("Server: {}\r\n", SERVER_NAME));
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str(if keep_alive {
            "Connection: keep-alive\r\n"
        } else {
            "Connection: close\r\n"
        });
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        if !self.head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_framing_headers() {
        let response = Response::text(StatusCode::OK, "hello");
        let wire = String::from_utf8(response.to_bytes(HttpVersion::Http11, true)).unwrap();

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 5\r\n"));
        assert!(wire.contains("Connection: keep-alive\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn head_only_keeps_length_drops_body() {
        let mut response = Response::text(StatusCode::OK, "hello");
        response.head_only = true;
        let wire = String::from_utf8(response.to_bytes(HttpVersion::Http10, false)).unwrap();

        assert!(wire.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 5\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn service_framing_headers_are_ignored() {
        let response = Response::new(StatusCode::NO_CONTENT)
            .with_header("Content-Length", "999")
            .with_header("X-Custom", "1");
        let wire = String::from_utf8(response.to_bytes(HttpVersion::Http11, true)).unwrap();

        assert!(!wire.contains("999"));
        assert!(wire.contains("X-Custom: 1\r\n"));
    }
}
