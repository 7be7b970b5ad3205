//! Virtual-host HTTP/HTTPS server.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!   client ──────▶│ net::Listener ──▶ ConnectionSlotPool (lease or drop)     │
//!   (http/https)  │        │                                                 │
//!                 │        ▼                                                 │
//!                 │ net::connection ◀──▶ http::state (parse, deadlines)      │
//!                 │        │                                                 │
//!                 │        ▼                                                 │
//!                 │ Runtime::dispatch ──▶ DomainRegistry::resolve(Host)      │
//!                 │        │                                                 │
//!                 │        ▼                                                 │
//!                 │ ServiceChainEngine ──▶ services ──▶ blacklist / sessions │
//!                 │                                     / statistics / files │
//!                 │                                                          │
//!                 │ config + watcher │ admin API │ lifecycle │ observability │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::TcpListener;

use vhost_server::admin::{setup_admin_router, AdminState};
use vhost_server::config::loader::load_domains;
use vhost_server::config::watcher::ConfigWatcher;
use vhost_server::config::{load_config, validate_config, ConfigError};
use vhost_server::lifecycle::{spawn_signal_handler, Shutdown};
use vhost_server::net::{self, tls::load_tls_acceptor};
use vhost_server::observability::{logging::init_logging, metrics};
use vhost_server::HttpServer;

#[derive(Parser)]
#[command(name = "vhost-server", version, about = "Virtual-host HTTP/HTTPS server")]
struct Args {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vhost-server starting");

    if let Some(path) = config.persistence.domains_path.clone() {
        if let Some(persisted) = load_domains(Path::new(&path))? {
            persisted.apply(&mut config);
            validate_config(&config).map_err(ConfigError::Validation)?;
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        max_connections = config.listener.max_connections,
        domains = config.domains.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = net::bind(&config.listener.bind_address).await?;
    let mut server = HttpServer::new(&config);
    if let Some(tls) = &config.listener.tls {
        let acceptor = load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
        let secure = net::bind(&tls.bind_address).await?;
        server = server.with_tls(secure, acceptor);
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    if config.admin.enabled {
        let app = setup_admin_router(AdminState::new(server.runtime(), &config.admin.api_key));
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = if args.no_watch {
        None
    } else {
        match watcher.run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, reload disabled");
                None
            }
        }
    };

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
