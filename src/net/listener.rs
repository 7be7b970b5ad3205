//! TCP listeners and accept loops.
//!
//! # Responsibilities
//! - Bind to configured address(es)
//! - Accept incoming TCP connections, one loop per protocol
//! - Enforce pool capacity: a connection without a slot is dropped at once
//! - Hand admitted sockets (after the TLS handshake, if any) to a connection task

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use crate::http::server::Runtime;
use crate::net::connection::serve_connection;
use crate::observability::metrics;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind a TCP listener.
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| ListenerError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { address: addr, source })?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(addr),
        "Listener bound"
    );
    Ok(listener)
}

/// An accept loop for one protocol.
pub struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    pub fn plain(inner: TcpListener) -> Self {
        Self { inner, tls: None }
    }

    pub fn tls(inner: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self {
            inner,
            tls: Some(acceptor),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept until shutdown. Never waits on request processing.
    pub async fn run(self, runtime: Arc<Runtime>, mut shutdown: broadcast::Receiver<()>) {
        let protocol = if self.is_secure() { "https" } else { "http" };
        tracing::info!(
            address = ?self.inner.local_addr().ok(),
            protocol,
            "Accepting connections"
        );

        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(&runtime, stream, peer),
                    Err(e) => {
                        tracing::warn!(protocol, error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(protocol, "Listener received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn admit(&self, runtime: &Arc<Runtime>, stream: TcpStream, peer: SocketAddr) {
        let secure = self.is_secure();
        let lease = match runtime.pool.acquire_lease(peer, secure) {
            Ok(lease) => lease,
            Err(e) => {
                runtime.record_rejected();
                metrics::record_rejected_connection();
                tracing::warn!(peer_addr = %peer, error = %e, "Connection rejected");
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        tracing::debug!(
            peer_addr = %peer,
            connection = %lease.handle(),
            in_use = runtime.pool.in_use(),
            "Connection accepted"
        );

        let runtime = Arc::clone(runtime);
        let shutdown = runtime.subscribe_shutdown();
        match &self.tls {
            None => {
                tokio::spawn(serve_connection(stream, lease, peer, false, runtime, shutdown));
            }
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                let handshake_timeout = runtime.timeouts().request;
                tokio::spawn(async move {
                    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => {
                            serve_connection(tls_stream, lease, peer, true, runtime, shutdown).await
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(peer_addr = %peer, error = %e, "TLS handshake failed")
                        }
                        Err(_) => tracing::debug!(peer_addr = %peer, "TLS handshake timed out"),
                    }
                });
            }
        }
    }
}
