//! Server runtime and top-level run loop.
//!
//! # Responsibilities
//! - Build the shared runtime (slot pool, domains, chain engine, collaborators)
//! - Resolve the Host header to a domain and run its chain off the reactor
//! - Start the listeners and the session sweeper
//! - Apply configuration updates while running
//! - Shut down: stop accepting, drain connections, persist domains
//!
//! # Data Flow
//! ```text
//! Listener ──▶ serve_connection ──▶ Runtime::dispatch
//!                                      │ DomainRegistry::resolve(Host)
//!                                      │   none     → 404
//!                                      │   disabled → 503
//!                                      ▼
//!                            spawn_blocking(ServiceChainEngine::run)
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::TlsAcceptor;

use crate::chain::services::{builtin_registry, ServiceDeps};
use crate::chain::{ConnectionInfo, ServiceChainEngine};
use crate::config::loader::save_domains;
use crate::config::{ConfigError, DomainsFile, ServerConfig};
use crate::domain::{Domain, DomainRegistry};
use crate::http::parser::ParseLimits;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::state::StateTimeouts;
use crate::net::{ConnectionSlotPool, Listener};
use crate::security::MemoryBlacklist;
use crate::session::MemorySessionStore;
use crate::statistics::HitStatistics;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State shared by listeners, connection tasks and the admin API.
pub struct Runtime {
    pub pool: Arc<ConnectionSlotPool>,
    pub domains: DomainRegistry,
    pub engine: Arc<ServiceChainEngine>,
    pub blacklist: Arc<MemoryBlacklist>,
    pub statistics: Arc<HitStatistics>,
    pub sessions: Arc<MemorySessionStore>,
    limits: ParseLimits,
    timeouts: StateTimeouts,
    max_requests_per_connection: u32,
    shutdown_grace: Duration,
    sweep_interval: Duration,
    domains_path: Option<PathBuf>,
    rejected: AtomicU64,
    started_at: Instant,
    shutdown: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

impl Runtime {
    pub fn new(config: &ServerConfig) -> Self {
        let blacklist = Arc::new(MemoryBlacklist::from_entries(&config.blacklist));
        let statistics = Arc::new(HitStatistics::new());
        let sessions = Arc::new(MemorySessionStore::new());

        let registry = builtin_registry(&ServiceDeps {
            blacklist: blacklist.clone(),
            statistics: statistics.clone(),
            sessions: sessions.clone(),
            cookie_name: config.sessions.cookie_name.clone(),
        });
        let (shutdown, _) = broadcast::channel(1);

        Self {
            pool: Arc::new(ConnectionSlotPool::new(config.listener.max_connections)),
            domains: DomainRegistry::from_config(config),
            engine: Arc::new(ServiceChainEngine::new(registry)),
            blacklist,
            statistics,
            sessions,
            limits: ParseLimits::from(&config.limits),
            timeouts: StateTimeouts::from(&config.timeouts),
            max_requests_per_connection: config.limits.max_requests_per_connection,
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
            sweep_interval: Duration::from_secs(config.sessions.sweep_interval_secs.max(1)),
            domains_path: config.persistence.domains_path.as_ref().map(PathBuf::from),
            rejected: AtomicU64::new(0),
            started_at: Instant::now(),
            shutdown,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn limits(&self) -> ParseLimits {
        self.limits
    }

    pub fn timeouts(&self) -> StateTimeouts {
        self.timeouts
    }

    /// 0 means unlimited.
    pub fn max_requests_per_connection(&self) -> u32 {
        self.max_requests_per_connection
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Count a connection refused because the pool was full.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Receiver for connection tasks, listeners and the sweeper.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Set before the broadcast, so receivers subscribed after it still observe shutdown.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolve the request's domain and run its chain.
    ///
    /// Returns the response and the name of the domain that handled it
    /// (`-` when no domain matched).
    pub async fn dispatch(&self, request: Request, connection: ConnectionInfo) -> (Response, String) {
        let host = request.host();
        let Some(domain) = self.domains.resolve(host.as_deref()) else {
            tracing::debug!(host = ?host, connection = %connection.handle, "No domain for host");
            return (Response::status_page(StatusCode::NOT_FOUND), "-".to_string());
        };

        let name = domain.name.clone();
        if !domain.enabled {
            tracing::debug!(domain = %name, "Domain disabled");
            return (Response::status_page(StatusCode::SERVICE_UNAVAILABLE), name);
        }

        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || engine.run(domain, request, connection)).await {
            Ok(response) => (response, name),
            Err(e) => {
                tracing::error!(domain = %name, error = %e, "Service chain task failed");
                (Response::internal_error(), name)
            }
        }
    }

    /// Apply a reloaded configuration.
    ///
    /// Domains and the static blacklist are replaced. Pool capacity, limits
    /// and timeouts keep their startup values.
    pub fn apply_config(&self, config: &ServerConfig) {
        self.domains.replace_all(
            config.domains.iter().map(Domain::from_config).collect(),
            config.default_domain.clone(),
        );
        self.blacklist.replace_all(&config.blacklist);
        tracing::info!(
            domains = config.domains.len(),
            blacklist = config.blacklist.len(),
            "Configuration applied"
        );
    }

    /// Current domain set in its persisted form.
    pub fn domains_file(&self) -> DomainsFile {
        DomainsFile {
            default_domain: self.domains.default_domain(),
            domains: self.domains.all().iter().map(|d| d.to_config()).collect(),
        }
    }

    /// Write the domain set to the persistence path, if one is configured.
    pub fn save_domains(&self) -> Result<(), ConfigError> {
        match &self.domains_path {
            Some(path) => save_domains(path, &self.domains_file()),
            None => Ok(()),
        }
    }

    /// Wait until every slot is released or the grace period ends.
    /// Returns false when connections were still open at the deadline.
    pub async fn wait_for_drain(&self) -> bool {
        let deadline = Instant::now() + self.shutdown_grace;
        while self.pool.in_use() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        true
    }
}

/// The virtual-host server.
pub struct HttpServer {
    runtime: Arc<Runtime>,
    secure: Option<(TcpListener, TlsAcceptor)>,
}

impl HttpServer {
    /// Create a new server with the given configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            runtime: Arc::new(Runtime::new(config)),
            secure: None,
        }
    }

    /// Also accept TLS connections on `listener`.
    pub fn with_tls(mut self, listener: TcpListener, acceptor: TlsAcceptor) -> Self {
        self.secure = Some((listener, acceptor));
        self
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }

    /// Serve until `shutdown` fires, applying configurations received on
    /// `config_updates` in the meantime.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let runtime = self.runtime;
        tracing::info!(
            address = %addr,
            tls = self.secure.is_some(),
            capacity = runtime.pool.capacity(),
            domains = runtime.domains.all().len(),
            "HTTP server starting"
        );

        let sweeper = tokio::spawn(
            Arc::clone(&runtime.sessions).run_sweeper(runtime.sweep_interval, runtime.subscribe_shutdown()),
        );

        let mut listeners = vec![tokio::spawn(
            Listener::plain(listener).run(Arc::clone(&runtime), runtime.subscribe_shutdown()),
        )];
        if let Some((secure, acceptor)) = self.secure {
            listeners.push(tokio::spawn(
                Listener::tls(secure, acceptor).run(Arc::clone(&runtime), runtime.subscribe_shutdown()),
            ));
        }

        loop {
            tokio::select! {
                update = config_updates.recv() => match update {
                    Some(config) => runtime.apply_config(&config),
                    None => {
                        let _ = shutdown.recv().await;
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!(open = runtime.pool.in_use(), "Shutdown requested, draining connections");
        runtime.begin_shutdown();
        for listener in listeners {
            let _ = listener.await;
        }

        if !runtime.wait_for_drain().await {
            tracing::warn!(
                open = runtime.pool.in_use(),
                grace_secs = runtime.shutdown_grace.as_secs(),
                "Grace period elapsed with connections still open"
            );
        }
        let _ = sweeper.await;

        if let Err(e) = runtime.save_domains() {
            tracing::error!(error = %e, "Failed to persist domains");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
