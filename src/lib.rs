//! Virtual-host HTTP/HTTPS server library.

pub mod admin;
pub mod chain;
pub mod config;
pub mod domain;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod session;
pub mod statistics;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
