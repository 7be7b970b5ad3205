//! Incremental HTTP/1.x request assembly.
//!
//! Bytes are appended with [`RequestAccumulator::feed`] as they arrive from the
//! socket. The accumulator advances only as far as the buffered data allows and
//! remembers where it stopped: a partial line is never rescanned, body bytes are
//! moved into the request as soon as they arrive. Delivering a request one byte
//! at a time produces exactly the same result as delivering it in one chunk.
//!
//! ```text
//! RequestLine ──▶ Headers ──┬──▶ FixedBody ───────────────────────────┬──▶ complete
//!                           ├──▶ ChunkSize ⇄ ChunkData ─▶ ChunkDataEnd │
//!                           │        └──▶ Trailers ───────────────────┤
//!                           └─────────────────────────────────────────┘
//! ```

use axum::http::{Method, StatusCode};

use crate::config::schema::LimitsConfig;
use crate::http::request::{Header, HttpVersion, Request};

/// Buffered-but-consumed bytes are compacted away once they pass this size.
const COMPACT_THRESHOLD: usize = 4 * 1024;

/// Longest accepted chunk-size field, in hex digits.
const MAX_CHUNK_SIZE_DIGITS: usize = 16;

/// Errors raised while assembling a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("invalid request method")]
    InvalidMethod,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("malformed chunked body")]
    MalformedChunk,
    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },
    #[error("request line exceeds {limit} bytes")]
    RequestLineTooLong { limit: usize },
    #[error("more than {limit} header fields")]
    TooManyHeaders { limit: usize },
}

impl ParseError {
    /// Whether this is a size-limit violation rather than malformed input.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(
            self,
            ParseError::RequestTooLarge { .. }
                | ParseError::RequestLineTooLong { .. }
                | ParseError::TooManyHeaders { .. }
        )
    }

    /// Status of the error response sent before closing.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::RequestLineTooLong { .. } => StatusCode::URI_TOO_LONG,
            ParseError::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ParseError::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Limits applied while assembling one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_request_size: usize,
    pub max_header_count: usize,
    pub max_request_line: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ParseLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_request_size: config.max_request_size,
            max_header_count: config.max_header_count,
            max_request_line: config.max_request_line,
        }
    }
}

/// Coarse progress of the request being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    RequestLine,
    Headers,
    Body,
}

/// Result of feeding bytes.
#[derive(Debug)]
pub enum Feed {
    /// More bytes are needed.
    Incomplete,
    /// A request is complete. Bytes past its end stay buffered.
    Complete(Request),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RequestLine,
    Headers,
    FixedBody { remaining: usize },
    ChunkSize,
    ChunkData { remaining: usize },
    ChunkDataEnd,
    Trailers,
}

/// Partially parsed request.
#[derive(Debug, Default)]
struct Partial {
    method: Option<Method>,
    target: String,
    version: Option<HttpVersion>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

/// Resumable request parser owning the connection's read buffer.
#[derive(Debug)]
pub struct RequestAccumulator {
    limits: ParseLimits,
    buf: Vec<u8>,
    /// Start of the bytes not yet consumed into the current request.
    pos: usize,
    /// Where the search for the next line feed resumes (`pos <= scan`).
    scan: usize,
    /// Wire bytes consumed for the current request so far.
    request_bytes: usize,
    phase: Phase,
    partial: Partial,
}

impl RequestAccumulator {
    pub fn new(limits: ParseLimits) -> Self {
        Self {
            limits,
            buf: Vec::new(),
            pos: 0,
            scan: 0,
            request_bytes: 0,
            phase: Phase::RequestLine,
            partial: Partial::default(),
        }
    }

    pub fn limits(&self) -> ParseLimits {
        self.limits
    }

    pub fn phase(&self) -> AssemblyPhase {
        match self.phase {
            Phase::RequestLine => AssemblyPhase::RequestLine,
            Phase::Headers => AssemblyPhase::Headers,
            _ => AssemblyPhase::Body,
        }
    }

    /// Whether unconsumed bytes are waiting (e.g. a pipelined request).
    pub fn has_buffered(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// Number of bytes accounted to the request in progress.
    pub fn request_bytes(&self) -> usize {
        self.request_bytes + self.pending_line_len()
    }

    /// Drop all state, including buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.scan = 0;
        self.reset_request();
    }

    /// Append bytes and advance as far as possible.
    ///
    /// Call with an empty slice to continue with already-buffered bytes after
    /// a completed request.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Feed, ParseError> {
        self.buf.extend_from_slice(bytes);
        let result = self.advance();
        self.compact();
        result
    }

    fn advance(&mut self) -> Result<Feed, ParseError> {
        loop {
            match self.phase {
                Phase::RequestLine => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Feed::Incomplete);
                    };
                    // RFC 9112 §2.2: ignore empty lines ahead of the request line.
                    if line.is_empty() {
                        continue;
                    }
                    self.parse_request_line(&line)?;
                    self.phase = Phase::Headers;
                }
                Phase::Headers => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Feed::Incomplete);
                    };
                    if line.is_empty() {
                        match self.body_phase()? {
                            Some(phase) => self.phase = phase,
                            None => return Ok(Feed::Complete(self.finish())),
                        }
                        continue;
                    }
                    self.parse_header(&line)?;
                }
                Phase::FixedBody { remaining } => {
                    let taken = self.take_body(remaining);
                    if taken < remaining {
                        self.phase = Phase::FixedBody { remaining: remaining - taken };
                        return Ok(Feed::Incomplete);
                    }
                    return Ok(Feed::Complete(self.finish()));
                }
                Phase::ChunkSize => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Feed::Incomplete);
                    };
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        self.phase = Phase::Trailers;
                    } else {
                        self.check_size(self.request_bytes.saturating_add(size))?;
                        self.phase = Phase::ChunkData { remaining: size };
                    }
                }
                Phase::ChunkData { remaining } => {
                    let taken = self.take_body(remaining);
                    if taken < remaining {
                        self.phase = Phase::ChunkData { remaining: remaining - taken };
                        return Ok(Feed::Incomplete);
                    }
                    self.phase = Phase::ChunkDataEnd;
                }
                Phase::ChunkDataEnd => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Feed::Incomplete);
                    };
                    if !line.is_empty() {
                        return Err(ParseError::MalformedChunk);
                    }
                    self.phase = Phase::ChunkSize;
                }
                Phase::Trailers => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Feed::Incomplete);
                    };
                    if line.is_empty() {
                        return Ok(Feed::Complete(self.finish()));
                    }
                    // Trailer fields are validated but not merged into the headers.
                    split_header(&line)?;
                }
            }
        }
    }

    /// Next complete line without its terminator, or `None` if the line feed
    /// has not arrived yet.
    fn next_line(&mut self) -> Result<Option<Vec<u8>>, ParseError> {
        match self.buf[self.scan..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scan + offset;
                let mut line = &self.buf[self.pos..end];
                if let [rest @ .., b'\r'] = line {
                    line = rest;
                }
                let line = line.to_vec();
                let consumed = end + 1 - self.pos;
                self.pos = end + 1;
                self.scan = self.pos;
                self.request_bytes += consumed;
                if self.phase == Phase::RequestLine && line.len() > self.limits.max_request_line {
                    return Err(ParseError::RequestLineTooLong { limit: self.limits.max_request_line });
                }
                self.check_size(self.request_bytes)?;
                Ok(Some(line))
            }
            None => {
                self.scan = self.buf.len();
                if self.phase == Phase::RequestLine && self.pending_line_len() > self.limits.max_request_line {
                    return Err(ParseError::RequestLineTooLong { limit: self.limits.max_request_line });
                }
                self.check_size(self.request_bytes())?;
                Ok(None)
            }
        }
    }

    fn pending_line_len(&self) -> usize {
        match self.phase {
            Phase::FixedBody { .. } | Phase::ChunkData { .. } => 0,
            _ => self.buf.len() - self.pos,
        }
    }

    fn check_size(&self, size: usize) -> Result<(), ParseError> {
        if size > self.limits.max_request_size {
            Err(ParseError::RequestTooLarge { limit: self.limits.max_request_size })
        } else {
            Ok(())
        }
    }

    fn take_body(&mut self, wanted: usize) -> usize {
        let available = self.buf.len() - self.pos;
        let taken = wanted.min(available);
        self.partial.body.extend_from_slice(&self.buf[self.pos..self.pos + taken]);
        self.pos += taken;
        self.scan = self.pos;
        self.request_bytes += taken;
        taken
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let mut parts = line.split(|&b| b == b' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedRequestLine);
        };

        if method.is_empty() || !method.iter().all(|&b| is_token_char(b)) {
            return Err(ParseError::InvalidMethod);
        }
        let method = Method::from_bytes(method).map_err(|_| ParseError::InvalidMethod)?;

        if target.is_empty() || target.iter().any(|&b| b <= b' ' || b == 0x7f) {
            return Err(ParseError::MalformedRequestLine);
        }
        let target = std::str::from_utf8(target).map_err(|_| ParseError::MalformedRequestLine)?;
        let version = HttpVersion::parse(version).ok_or(ParseError::MalformedRequestLine)?;

        self.partial.method = Some(method);
        self.partial.target = target.to_string();
        self.partial.version = Some(version);
        Ok(())
    }

    fn parse_header(&mut self, line: &[u8]) -> Result<(), ParseError> {
        if self.partial.headers.len() >= self.limits.max_header_count {
            return Err(ParseError::TooManyHeaders { limit: self.limits.max_header_count });
        }
        let header = split_header(line)?;
        self.partial.headers.push(header);
        Ok(())
    }

    /// Decide body framing once the header block is complete.
    fn body_phase(&self) -> Result<Option<Phase>, ParseError> {
        let headers = &self.partial.headers;

        let transfer_encodings: Vec<&str> = headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("transfer-encoding"))
            .flat_map(|h| h.value.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        if !transfer_encodings.is_empty() {
            let chunked_only = transfer_encodings.len() == 1
                && transfer_encodings[0].eq_ignore_ascii_case("chunked");
            if !chunked_only || self.partial.version != Some(HttpVersion::Http11) {
                return Err(ParseError::UnsupportedTransferEncoding);
            }
            return Ok(Some(Phase::ChunkSize));
        }

        let mut content_length: Option<usize> = None;
        for value in headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("content-length"))
            .flat_map(|h| h.value.split(','))
        {
            let value = value.trim();
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::InvalidContentLength);
            }
            let parsed: usize = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
            match content_length {
                Some(existing) if existing != parsed => return Err(ParseError::InvalidContentLength),
                _ => content_length = Some(parsed),
            }
        }

        match content_length {
            Some(0) | None => Ok(None),
            Some(length) => {
                self.check_size(self.request_bytes.saturating_add(length))?;
                Ok(Some(Phase::FixedBody { remaining: length }))
            }
        }
    }

    fn finish(&mut self) -> Request {
        let partial = std::mem::take(&mut self.partial);
        self.reset_request();
        Request {
            method: partial.method.unwrap_or(Method::GET),
            target: partial.target,
            version: partial.version.unwrap_or(HttpVersion::Http11),
            headers: partial.headers,
            body: partial.body,
        }
    }

    fn reset_request(&mut self) {
        self.phase = Phase::RequestLine;
        self.request_bytes = 0;
        self.partial = Partial::default();
    }

    fn compact(&mut self) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
            self.scan = 0;
        } else if self.pos >= COMPACT_THRESHOLD {
            self.buf.drain(..self.pos);
            self.scan -= self.pos;
            self.pos = 0;
        }
    }
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn split_header(line: &[u8]) -> Result<Header, ParseError> {
    // Obsolete line folding is rejected (RFC 9112 §5.2).
    if matches!(line.first(), Some(b' ' | b'\t')) {
        return Err(ParseError::MalformedHeader);
    }
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::MalformedHeader)?;
    let (name, value) = (&line[..colon], &line[colon + 1..]);
    if name.is_empty() || !name.iter().all(|&b| is_token_char(b)) {
        return Err(ParseError::MalformedHeader);
    }
    if value.iter().any(|&b| (b < b' ' && b != b'\t') || b == 0x7f) {
        return Err(ParseError::MalformedHeader);
    }
    let value = String::from_utf8_lossy(value);
    Ok(Header {
        name: String::from_utf8_lossy(name).into_owned(),
        value: value.trim_matches([' ', '\t']).to_string(),
    })
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    let digits_end = line
        .iter()
        .position(|&b| !b.is_ascii_hexdigit())
        .unwrap_or(line.len());
    let (digits, rest) = line.split_at(digits_end);
    if digits.is_empty() || digits.len() > MAX_CHUNK_SIZE_DIGITS {
        return Err(ParseError::MalformedChunk);
    }
    let rest_ok = match rest.iter().position(|&b| b != b' ' && b != b'\t') {
        None => true,
        Some(i) => rest[i] == b';',
    };
    if !rest_ok {
        return Err(ParseError::MalformedChunk);
    }
    let digits = std::str::from_utf8(digits).map_err(|_| ParseError::MalformedChunk)?;
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::MalformedChunk)
}
