//! Per-connection driver.
//!
//! # Responsibilities
//! - Own the socket (plain or TLS) and the connection state machine
//! - Read with the deadline of the current state; a missed deadline closes
//!   the connection without a response
//! - Dispatch each complete request, write the response, then keep alive or close
//! - Publish every state change into the slot pool through the connection handle
//!
//! # Data Flow
//! ```text
//! socket bytes → ConnectionStateMachine::on_bytes
//!     NeedMore → read again (parse cursor kept)
//!     Ready    → Runtime::dispatch → response bytes → socket
//!     Error    → 400 / 413 / 414 / 431 / 501, close
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time;

use crate::chain::ConnectionInfo;
use crate::http::parser::ParseError;
use crate::http::request::HttpVersion;
use crate::http::response::Response;
use crate::http::server::Runtime;
use crate::http::state::{ConnectionState, ConnectionStateMachine, Progress};
use crate::net::pool::SlotLease;
use crate::observability::metrics;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Why a connection closed abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),
    #[error("timed out in state {0:?}")]
    Timeout(ConnectionState),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

enum ReadOutcome {
    Bytes(usize),
    Eof,
    Shutdown,
}

struct Connection<S> {
    stream: S,
    info: ConnectionInfo,
    machine: ConnectionStateMachine,
    runtime: Arc<Runtime>,
    shutdown: broadcast::Receiver<()>,
    /// Shutdown seen: finish the current request, then close.
    draining: bool,
}

/// Serve one accepted connection until it closes. The slot is released when
/// `lease` drops at the end.
pub async fn serve_connection<S>(
    stream: S,
    lease: SlotLease,
    peer: SocketAddr,
    secure: bool,
    runtime: Arc<Runtime>,
    shutdown: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let handle = lease.handle();
    metrics::connection_opened();

    let machine = ConnectionStateMachine::new(runtime.limits(), runtime.timeouts(), Instant::now());
    let mut conn = Connection {
        stream,
        info: ConnectionInfo { handle, peer, secure },
        machine,
        runtime,
        shutdown,
        draining: false,
    };

    match conn.drive().await {
        Ok(()) => tracing::debug!(
            connection = %handle,
            requests = conn.machine.requests_served(),
            "Connection closed"
        ),
        Err(ConnectionError::Timeout(state)) => tracing::info!(
            connection = %handle,
            peer_addr = %peer,
            state = ?state,
            "Connection timed out"
        ),
        Err(ConnectionError::Parse(e)) => tracing::debug!(
            connection = %handle,
            peer_addr = %peer,
            error = %e,
            "Connection closed after protocol error"
        ),
        Err(ConnectionError::Io(e)) => tracing::debug!(
            connection = %handle,
            error = %e,
            "Connection I/O error"
        ),
    }

    conn.machine.close();
    conn.publish();
    let write_timeout = conn.runtime.timeouts().write;
    let _ = time::timeout(write_timeout, conn.stream.shutdown()).await;
    metrics::connection_closed();
    drop(lease);
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn drive(&mut self) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            self.poll_shutdown();

            // Pipelined bytes left over from the previous request come first.
            let progress = match self.machine.resume(Instant::now()) {
                Ok(progress) => progress,
                Err(e) => return self.reject(e).await,
            };

            if progress == Progress::NeedMore {
                if self.draining && self.is_idle() {
                    return Ok(());
                }
                self.publish();

                match self.read(&mut buf).await? {
                    ReadOutcome::Bytes(n) => match self.machine.on_bytes(&buf[..n], Instant::now()) {
                        Ok(Progress::Ready) => {}
                        Ok(Progress::NeedMore) => continue,
                        Err(e) => return self.reject(e).await,
                    },
                    ReadOutcome::Eof => return Ok(()),
                    ReadOutcome::Shutdown => continue,
                }
            }

            if !self.serve_one().await? {
                return Ok(());
            }
        }
    }

    /// Run the chain for the ready request and write its response.
    /// Returns whether the connection stays open.
    async fn serve_one(&mut self) -> Result<bool, ConnectionError> {
        let Some(request) = self.machine.begin_chain() else {
            unreachable!("serve_one called in state {:?}", self.machine.state());
        };
        self.publish();

        let start = Instant::now();
        let version = request.version;
        let client_keep_alive = request.wants_keep_alive();
        let method = request.method.clone();
        let target = request.target.clone();

        let (mut response, domain) = self.runtime.dispatch(request, self.info).await;
        if method == Method::HEAD {
            response.head_only = true;
        }
        self.machine.chain_finished(Instant::now());
        self.publish();

        self.poll_shutdown();
        let limit = self.runtime.max_requests_per_connection();
        let limit_reached = limit > 0 && self.machine.requests_served() + 1 >= limit;
        let keep_alive = client_keep_alive && !self.draining && !limit_reached;

        self.write(&response.to_bytes(version, keep_alive)).await?;

        let status = response.status.as_u16();
        metrics::record_request(&domain, status, start);
        tracing::debug!(
            connection = %self.info.handle,
            method = %method,
            target = %target,
            domain = %domain,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request served"
        );

        let next = self.machine.transfer_finished(keep_alive, Instant::now());
        Ok(next == ConnectionState::KeepAlive)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, ConnectionError> {
        let deadline = self
            .machine
            .deadline()
            .unwrap_or_else(|| Instant::now() + self.runtime.timeouts().request);
        let state = self.machine.state();

        tokio::select! {
            read = time::timeout_at(time::Instant::from_std(deadline), self.stream.read(buf)) => match read {
                Ok(Ok(0)) => Ok(ReadOutcome::Eof),
                Ok(Ok(n)) => Ok(ReadOutcome::Bytes(n)),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => {
                    self.machine.expire(Instant::now());
                    Err(ConnectionError::Timeout(state))
                }
            },
            _ = self.shutdown.recv(), if !self.draining => {
                self.draining = true;
                Ok(ReadOutcome::Shutdown)
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let timeout = self.runtime.timeouts().write;
        let written = time::timeout(timeout, async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        })
        .await;

        match written {
            Ok(result) => result.map_err(ConnectionError::from),
            Err(_) => Err(ConnectionError::Timeout(self.machine.state())),
        }
    }

    /// Answer a request that failed to parse, then close.
    async fn reject(&mut self, error: ParseError) -> Result<(), ConnectionError> {
        let response = Response::status_page(error.status());
        tracing::debug!(
            connection = %self.info.handle,
            status = response.status.as_u16(),
            error = %error,
            "Rejecting request"
        );
        let _ = self.write(&response.to_bytes(HttpVersion::Http11, false)).await;
        Err(ConnectionError::Parse(error))
    }

    /// Nothing received since the last response.
    fn is_idle(&self) -> bool {
        match self.machine.state() {
            ConnectionState::KeepAlive => true,
            ConnectionState::AwaitingRequestLine => !self.machine.has_buffered(),
            _ => false,
        }
    }

    fn poll_shutdown(&mut self) {
        if self.draining {
            return;
        }
        if self.runtime.is_shutting_down()
            || !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty))
        {
            self.draining = true;
        }
    }

    fn publish(&self) {
        self.runtime.pool.publish(
            self.info.handle,
            self.machine.state(),
            self.machine.requests_served(),
        );
    }
}
