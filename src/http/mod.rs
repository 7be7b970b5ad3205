//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! connection bytes
//!     → parser.rs (incremental request assembly, size limits)
//!     → state.rs (connection states and deadlines)
//!     → server.rs (Host → domain, service chain on the blocking pool)
//!     → response.rs (HTTP/1.x serialization)
//! ```

pub mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use request::{Header, HttpVersion, Request};
pub use response::Response;
pub use server::{HttpServer, Runtime};
