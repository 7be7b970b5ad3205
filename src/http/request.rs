//! Assembled HTTP requests.
//!
//! # Responsibilities
//! - Hold the parsed request line, headers and decoded body
//! - Case-insensitive header lookup
//! - Keep-alive negotiation from the `Connection` header
//!
//! # Design Decisions
//! - Headers are kept in arrival order; duplicates are preserved
//! - The body is fully buffered (requests are bounded by `max_request_size`)

use std::fmt;

use axum::http::Method;

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    /// Well-formed but unsupported version (e.g. HTTP/2.0 over plain text).
    Other(u8, u8),
}

impl HttpVersion {
    /// Parse `HTTP/<digit>.<digit>`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'H', b'T', b'T', b'P', b'/', major, b'.', minor]
                if major.is_ascii_digit() && minor.is_ascii_digit() =>
            {
                Some(match (major - b'0', minor - b'0') {
                    (1, 0) => HttpVersion::Http10,
                    (1, 1) => HttpVersion::Http11,
                    (major, minor) => HttpVersion::Other(major, minor),
                })
            }
            _ => None,
        }
    }

    /// Version used on the status line of a response to this request.
    pub fn response_version(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http10 => f.write_str("HTTP/1.0"),
            HttpVersion::Http11 => f.write_str("HTTP/1.1"),
            HttpVersion::Other(major, minor) => write!(f, "HTTP/{}.{}", major, minor),
        }
    }
}

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A complete request, ready for a service chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Raw request target as sent (`/a/b?x=1`).
    pub target: String,
    pub version: HttpVersion,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl Request {
    /// Path component of the target, without the query string.
    pub fn path(&self) -> &str {
        let without_query = self.target.split('?').next().unwrap_or("");
        // absolute-form: http://host/path
        match without_query.find("://") {
            Some(scheme_end) => {
                let rest = &without_query[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => without_query,
        }
    }

    /// Query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for a header name (case-insensitive).
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Host header without port, lowercased.
    pub fn host(&self) -> Option<String> {
        let host = self.header("host")?.trim();
        let without_port = if host.starts_with('[') {
            // [::1]:8080
            host.split_once(']').map(|(h, _)| &h[1..]).unwrap_or(host)
        } else {
            host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
        };
        Some(without_port.to_ascii_lowercase())
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// Whether the client asked for a persistent connection.
    pub fn wants_keep_alive(&self) -> bool {
        let tokens = || {
            self.header_values("connection")
                .flat_map(|v| v.split(','))
                .map(str::trim)
        };
        match self.version {
            HttpVersion::Http10 => tokens().any(|t| t.eq_ignore_ascii_case("keep-alive")),
            _ => !tokens().any(|t| t.eq_ignore_ascii_case("close")),
        }
    }

    /// Value of a cookie sent by the client.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header_values("cookie")
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}
