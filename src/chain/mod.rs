//! Service chain subsystem.
//!
//! # Data Flow
//! ```text
//! Complete request + resolved Arc<Domain>
//!     → engine.rs (fresh ChainContext, services in domain order)
//!     → service.rs (Service::execute → Next | Abort | Error)
//!     → services/ (built-in stages: guards, session, body, resource, transfer)
//!     → Response handed back to the connection driver
//! ```
//!
//! # Design Decisions
//! - Chain order is data: a `Vec<ServiceId>` per domain
//! - Services are synchronous and never suspend mid-chain
//! - Context values are typed by key, scoped to one run

pub mod context;
pub mod engine;
pub mod service;
pub mod services;

pub use context::{keys, ChainContext, ConnectionInfo, ContextKey, KeyTag};
pub use engine::ServiceChainEngine;
pub use service::{Service, ServiceId, ServiceRegistry, ServiceResult};
