//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vhost_server::config::{DomainConfig, ServerConfig};
use vhost_server::http::Runtime;
use vhost_server::{HttpServer, Shutdown};

pub const SHOP: &str = "shop.example";
pub const CLOSED: &str = "closed.example";
pub const MOVED: &str = "moved.example";

/// Document root with a couple of files.
pub fn document_root() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
    std::fs::create_dir(root.path().join("docs")).unwrap();
    std::fs::write(root.path().join("docs").join("guide.txt"), "read me").unwrap();
    root
}

/// Three domains over one root: served, disabled, and forwarding. Short
/// timeouts so idle connections close quickly.
pub fn test_config(root: &Path) -> ServerConfig {
    let document_root = root.to_string_lossy().into_owned();
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.max_connections = 16;
    config.timeouts.request_secs = 1;
    config.timeouts.keep_alive_secs = 1;
    config.timeouts.write_secs = 2;
    config.timeouts.shutdown_grace_secs = 2;
    config.domains = vec![
        DomainConfig {
            name: SHOP.into(),
            aliases: vec!["www.shop.example".into()],
            document_root: document_root.clone(),
            ..DomainConfig::default()
        },
        DomainConfig {
            name: CLOSED.into(),
            document_root: document_root.clone(),
            enabled: false,
            ..DomainConfig::default()
        },
        DomainConfig {
            name: MOVED.into(),
            document_root,
            forward_url: Some("https://new.example/".into()),
            ..DomainConfig::default()
        },
    ];
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub runtime: Arc<Runtime>,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ServerConfig>,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    /// Trigger shutdown and wait for the run loop to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&config);
    let runtime = server.runtime();
    let shutdown = Shutdown::new();
    let (config_updates, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(server.run(listener, rx, shutdown.subscribe()));
    TestServer {
        addr,
        runtime,
        shutdown,
        config_updates,
        handle,
    }
}

/// Send raw bytes on a fresh connection and read until the server closes it.
pub async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_to_close(&mut stream).await
}

pub async fn read_to_close(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("connection was not closed")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

/// Read until `needle` has been received.
pub async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !String::from_utf8_lossy(&out).contains(needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before {:?} arrived", needle);
            out.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("response did not arrive");
    String::from_utf8_lossy(&out).into_owned()
}

pub fn get(host: &str, path: &str, connection: &str) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: {}\r\n\r\n",
        path, host, connection
    )
    .into_bytes()
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}
