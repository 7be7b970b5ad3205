//! Client sessions.
//!
//! # Data Flow
//! ```text
//! resolve-session service
//!     → SessionStore::lookup (cookie value) or SessionStore::new_session
//!     → SessionBinding stored in the chain context
//! refresh-session service
//!     → SessionStore::refresh (domain session timeout)
//! sweeper task
//!     → store.rs sweep_expired on an interval until shutdown
//! ```

pub mod store;

use std::net::IpAddr;
use std::time::Duration;

use uuid::Uuid;

pub use store::MemorySessionStore;

/// Reference to a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub id: Uuid,
    pub domain: String,
}

/// Session resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub session: SessionRef,
    /// True when this request created the session; the response sets the cookie.
    pub created: bool,
}

/// Session storage consumed by the chain.
pub trait SessionStore: Send + Sync {
    fn new_session(&self, domain: &str, client: IpAddr, timeout: Duration) -> SessionRef;

    /// Live session with this id in `domain`, if any.
    fn lookup(&self, domain: &str, id: &str) -> Option<SessionRef>;

    /// Extend the session's expiry. Returns false for unknown sessions.
    fn refresh(&self, session: &SessionRef, timeout: Duration) -> bool;
}
