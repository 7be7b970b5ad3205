//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ServerConfig (validated)
//!     → domains / blacklist built from it
//!
//! Persisted domains file (optional):
//!     startup  → loader.rs load_domains → overrides [[domains]]
//!     shutdown → loader.rs save_domains ← current domain registry
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → server swaps in the new domain set and blacklist
//! ```
//!
//! # Design Decisions
//! - All sections have defaults so a config may list only its domains
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener and pool settings need a restart; domains and blacklist reload live

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, DomainsFile};
pub use schema::{
    AdminConfig, BlacklistEntry, DomainConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PersistenceConfig, ServerConfig, SessionConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
