//! Per-connection lifecycle state machine.
//!
//! # States
//! ```text
//! Free → AwaitingRequestLine → AccumulatingHeaders → AwaitingBody (if declared)
//!      → ReadyForChain → ChainExecuting → AwaitingTransfer
//!      → KeepAlive → AwaitingRequestLine      (persistent connection)
//!      → Closing → Free                       (slot released)
//! ```
//!
//! # Design Decisions
//! - The machine owns the request accumulator, so the parse cursor survives
//!   between socket reads
//! - Deadlines are computed from the last activity and the current state; the
//!   driver sleeps until the deadline instead of polling
//! - Any parse failure moves straight to `Closing`

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::schema::TimeoutConfig;
use crate::http::parser::{AssemblyPhase, Feed, ParseError, ParseLimits, RequestAccumulator};
use crate::http::request::Request;

/// Lifecycle state of a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Free,
    AwaitingRequestLine,
    AccumulatingHeaders,
    AwaitingBody,
    ReadyForChain,
    ChainExecuting,
    AwaitingTransfer,
    KeepAlive,
    Closing,
}

impl ConnectionState {
    /// States in which the connection reads from the socket.
    pub fn is_receiving(self) -> bool {
        matches!(
            self,
            ConnectionState::AwaitingRequestLine
                | ConnectionState::AccumulatingHeaders
                | ConnectionState::AwaitingBody
                | ConnectionState::KeepAlive
        )
    }
}

/// Inactivity deadlines per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTimeouts {
    /// While a request is arriving.
    pub request: Duration,
    /// Idle between requests.
    pub keep_alive: Duration,
    /// While a response is being written.
    pub write: Duration,
}

impl From<&TimeoutConfig> for StateTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            request: Duration::from_secs(config.request_secs),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            write: Duration::from_secs(config.write_secs),
        }
    }
}

impl Default for StateTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Outcome of delivering bytes to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still assembling; wait for more bytes.
    NeedMore,
    /// A complete request is waiting in `ReadyForChain`.
    Ready,
}

/// Drives one connection from its first byte to close.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    accumulator: RequestAccumulator,
    timeouts: StateTimeouts,
    last_activity: Instant,
    ready: Option<Request>,
    requests_served: u32,
}

impl ConnectionStateMachine {
    /// Machine for a freshly acquired slot.
    pub fn new(limits: ParseLimits, timeouts: StateTimeouts, now: Instant) -> Self {
        Self {
            state: ConnectionState::AwaitingRequestLine,
            accumulator: RequestAccumulator::new(limits),
            timeouts,
            last_activity: now,
            ready: None,
            requests_served: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Requests whose responses were fully transferred.
    pub fn requests_served(&self) -> u32 {
        self.requests_served
    }

    /// Whether pipelined bytes are waiting to be parsed.
    pub fn has_buffered(&self) -> bool {
        self.accumulator.has_buffered()
    }

    /// When the current state times out, if it has a deadline.
    pub fn deadline(&self) -> Option<Instant> {
        let timeout = match self.state {
            ConnectionState::AwaitingRequestLine
            | ConnectionState::AccumulatingHeaders
            | ConnectionState::AwaitingBody => self.timeouts.request,
            ConnectionState::KeepAlive => self.timeouts.keep_alive,
            ConnectionState::AwaitingTransfer => self.timeouts.write,
            ConnectionState::ReadyForChain
            | ConnectionState::ChainExecuting
            | ConnectionState::Closing
            | ConnectionState::Free => return None,
        };
        Some(self.last_activity + timeout)
    }

    /// Force `Closing` if the state's deadline has passed. Returns whether it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.state = ConnectionState::Closing;
                true
            }
            _ => false,
        }
    }

    /// Deliver bytes read from the socket.
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant) -> Result<Progress, ParseError> {
        debug_assert!(
            self.state.is_receiving(),
            "bytes delivered in state {:?}",
            self.state
        );
        if !bytes.is_empty() {
            self.last_activity = now;
        }
        if self.state == ConnectionState::KeepAlive {
            self.state = ConnectionState::AwaitingRequestLine;
        }

        match self.accumulator.feed(bytes) {
            Ok(Feed::Complete(request)) => {
                self.ready = Some(request);
                self.state = ConnectionState::ReadyForChain;
                Ok(Progress::Ready)
            }
            Ok(Feed::Incomplete) => {
                self.state = match self.accumulator.phase() {
                    AssemblyPhase::RequestLine => ConnectionState::AwaitingRequestLine,
                    AssemblyPhase::Headers => ConnectionState::AccumulatingHeaders,
                    AssemblyPhase::Body => ConnectionState::AwaitingBody,
                };
                Ok(Progress::NeedMore)
            }
            Err(err) => {
                self.state = ConnectionState::Closing;
                Err(err)
            }
        }
    }

    /// Continue with buffered bytes after entering `KeepAlive`.
    pub fn resume(&mut self, now: Instant) -> Result<Progress, ParseError> {
        if self.state == ConnectionState::KeepAlive && self.accumulator.has_buffered() {
            self.on_bytes(&[], now)
        } else {
            Ok(Progress::NeedMore)
        }
    }

    /// Hand the assembled request to the chain: `ReadyForChain → ChainExecuting`.
    pub fn begin_chain(&mut self) -> Option<Request> {
        if self.state != ConnectionState::ReadyForChain {
            return None;
        }
        let request = self.ready.take()?;
        self.state = ConnectionState::ChainExecuting;
        Some(request)
    }

    /// `ChainExecuting → AwaitingTransfer`.
    pub fn chain_finished(&mut self, now: Instant) {
        debug_assert_eq!(self.state, ConnectionState::ChainExecuting);
        self.state = ConnectionState::AwaitingTransfer;
        self.last_activity = now;
    }

    /// Response written: `AwaitingTransfer → KeepAlive | Closing`.
    pub fn transfer_finished(&mut self, keep_alive: bool, now: Instant) -> ConnectionState {
        debug_assert_eq!(self.state, ConnectionState::AwaitingTransfer);
        self.requests_served += 1;
        self.last_activity = now;
        self.state = if keep_alive {
            ConnectionState::KeepAlive
        } else {
            ConnectionState::Closing
        };
        self.state
    }

    /// Move to `Closing` from any state.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closing;
        self.ready = None;
        self.accumulator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(now: Instant) -> ConnectionStateMachine {
        ConnectionStateMachine::new(ParseLimits::default(), StateTimeouts::default(), now)
    }

    #[test]
    fn full_lifecycle_with_keep_alive() {
        let now = Instant::now();
        let mut m = machine(now);
        assert_eq!(m.state(), ConnectionState::AwaitingRequestLine);

        assert_eq!(m.on_bytes(b"POST /x HTTP/1.1\r\n", now).unwrap(), Progress::NeedMore);
        assert_eq!(m.state(), ConnectionState::AccumulatingHeaders);

        assert_eq!(m.on_bytes(b"Content-Length: 2\r\n\r\n", now).unwrap(), Progress::NeedMore);
        assert_eq!(m.state(), ConnectionState::AwaitingBody);

        assert_eq!(m.on_bytes(b"ok", now).unwrap(), Progress::Ready);
        assert_eq!(m.state(), ConnectionState::ReadyForChain);

        let request = m.begin_chain().unwrap();
        assert_eq!(request.body, b"ok");
        assert_eq!(m.state(), ConnectionState::ChainExecuting);
        assert!(m.begin_chain().is_none());

        m.chain_finished(now);
        assert_eq!(m.state(), ConnectionState::AwaitingTransfer);

        assert_eq!(m.transfer_finished(true, now), ConnectionState::KeepAlive);
        assert_eq!(m.requests_served(), 1);

        assert_eq!(m.on_bytes(b"GET / HTTP/1.1\r\n\r\n", now).unwrap(), Progress::Ready);
        m.begin_chain().unwrap();
        m.chain_finished(now);
        assert_eq!(m.transfer_finished(false, now), ConnectionState::Closing);
        assert_eq!(m.requests_served(), 2);
    }

    #[test]
    fn ready_exactly_when_body_completes_bytewise() {
        let now = Instant::now();
        let wire = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nabcde";
        let mut m = machine(now);
        for (i, b) in wire.iter().enumerate() {
            let progress = m.on_bytes(std::slice::from_ref(b), now).unwrap();
            if i + 1 < wire.len() {
                assert_eq!(progress, Progress::NeedMore, "byte {}", i);
            } else {
                assert_eq!(progress, Progress::Ready);
            }
        }
        let bytewise = m.begin_chain().unwrap();

        let mut bulk = machine(now);
        assert_eq!(bulk.on_bytes(wire, now).unwrap(), Progress::Ready);
        assert_eq!(bulk.begin_chain().unwrap(), bytewise);
    }

    #[test]
    fn oversize_request_closes() {
        let now = Instant::now();
        let limits = ParseLimits { max_request_size: 32, ..ParseLimits::default() };
        let mut m = ConnectionStateMachine::new(limits, StateTimeouts::default(), now);

        let err = m.on_bytes(b"GET /aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", now).unwrap_err();
        assert!(err.is_payload_too_large());
        assert_eq!(m.state(), ConnectionState::Closing);
        assert!(m.begin_chain().is_none());
    }

    #[test]
    fn deadlines_depend_on_state() {
        let start = Instant::now();
        let timeouts = StateTimeouts {
            request: Duration::from_secs(5),
            keep_alive: Duration::from_secs(60),
            write: Duration::from_secs(10),
        };
        let mut m = ConnectionStateMachine::new(ParseLimits::default(), timeouts, start);
        assert_eq!(m.deadline(), Some(start + Duration::from_secs(5)));

        m.on_bytes(b"GET / HTTP/1.1\r\n\r\n", start).unwrap();
        assert_eq!(m.deadline(), None);
        m.begin_chain().unwrap();
        assert_eq!(m.deadline(), None);

        let later = start + Duration::from_secs(1);
        m.chain_finished(later);
        assert_eq!(m.deadline(), Some(later + Duration::from_secs(10)));

        m.transfer_finished(true, later);
        assert_eq!(m.deadline(), Some(later + Duration::from_secs(60)));
        assert!(!m.expire(later + Duration::from_secs(30)));
        assert!(m.expire(later + Duration::from_secs(60)));
        assert_eq!(m.state(), ConnectionState::Closing);
    }

    #[test]
    fn partial_request_times_out() {
        let start = Instant::now();
        let mut m = machine(start);
        m.on_bytes(b"GET / HT", start).unwrap();
        let deadline = m.deadline().unwrap();
        assert!(m.expire(deadline));
        assert_eq!(m.state(), ConnectionState::Closing);
    }

    #[test]
    fn pipelined_request_resumes_after_keep_alive() {
        let now = Instant::now();
        let mut m = machine(now);
        assert_eq!(
            m.on_bytes(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n", now).unwrap(),
            Progress::Ready
        );
        assert_eq!(m.begin_chain().unwrap().target, "/a");
        m.chain_finished(now);
        m.transfer_finished(true, now);
        assert!(m.has_buffered());

        assert_eq!(m.resume(now).unwrap(), Progress::Ready);
        assert_eq!(m.begin_chain().unwrap().target, "/b");
        m.chain_finished(now);
        m.transfer_finished(true, now);

        assert_eq!(m.resume(now).unwrap(), Progress::NeedMore);
        assert_eq!(m.state(), ConnectionState::KeepAlive);
    }
}
