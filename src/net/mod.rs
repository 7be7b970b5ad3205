//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, one per protocol)
//!     → pool.rs (slot lease, or the socket is dropped)
//!     → tls.rs (handshake on the secure listener)
//!     → connection.rs (state machine, dispatch, keep-alive)
//! ```
//!
//! # Design Decisions
//! - Both listeners share one slot pool
//! - Connection tasks own their sockets; the pool only tracks slot records
//! - TLS is transparent to the connection driver

pub mod connection;
pub mod listener;
pub mod pool;
pub mod tls;

pub use listener::{bind, Listener, ListenerError};
pub use pool::{ConnectionHandle, ConnectionSlotPool, PoolExhausted, SlotLease, SlotSnapshot};
