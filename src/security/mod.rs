//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → reject-blacklisted service
//!     → blacklist.rs (action for the client address)
//!     → Block / BlockAndLog → 403, Allow → continue
//! ```
//!
//! # Design Decisions
//! - Lookups are lock-free for readers (sharded map)
//! - Admin edits and config reloads apply between requests

pub mod blacklist;

pub use blacklist::{Blacklist, BlacklistAction, MemoryBlacklist};
