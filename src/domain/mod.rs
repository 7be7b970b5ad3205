//! Virtual-host domains.
//!
//! # Data Flow
//! ```text
//! [[domains]] config / persisted domains file
//!     → Domain::from_config (defaults filled, chain resolved)
//!     → registry.rs (immutable snapshot, Host resolution)
//!     → Arc<Domain> held by one chain run
//! ```
//!
//! # Design Decisions
//! - A `Domain` never changes once published; edits publish a new snapshot
//! - A chain in progress keeps the snapshot it started with

pub mod registry;

use std::path::PathBuf;
use std::time::Duration;

use crate::chain::services::default_chain;
use crate::chain::ServiceId;
use crate::config::DomainConfig;

pub use registry::DomainRegistry;

/// One virtual host.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: String,
    pub aliases: Vec<String>,
    pub document_root: PathBuf,
    pub enabled: bool,
    pub session_timeout: Duration,
    pub forward_url: Option<String>,
    pub index_file: String,
    pub service_chain: Vec<ServiceId>,
}

impl Domain {
    /// Build a domain from its configuration. An empty chain gets the default chain.
    pub fn from_config(config: &DomainConfig) -> Self {
        let service_chain = if config.service_chain.is_empty() {
            default_chain()
        } else {
            config.service_chain.clone()
        };

        Self {
            name: config.name.to_ascii_lowercase(),
            aliases: config.aliases.iter().map(|a| a.to_ascii_lowercase()).collect(),
            document_root: PathBuf::from(&config.document_root),
            enabled: config.enabled,
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            forward_url: config.forward_url.clone(),
            index_file: config.index_file.clone(),
            service_chain,
        }
    }

    pub fn to_config(&self) -> DomainConfig {
        DomainConfig {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            document_root: self.document_root.to_string_lossy().into_owned(),
            enabled: self.enabled,
            session_timeout_secs: self.session_timeout.as_secs(),
            forward_url: self.forward_url.clone(),
            index_file: self.index_file.clone(),
            service_chain: self.service_chain.clone(),
        }
    }

    /// Whether `host` (lowercase, without port) names this domain.
    pub fn matches_host(&self, host: &str) -> bool {
        self.name == host || self.aliases.iter().any(|alias| alias == host)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_domain(name: &str, root: &str) -> Domain {
        Domain::from_config(&DomainConfig {
            name: name.to_string(),
            document_root: root.to_string(),
            ..DomainConfig::default()
        })
    }

    #[test]
    fn empty_chain_gets_default_chain() {
        let domain = test_domain("Shop.Example", "/srv/shop");
        assert_eq!(domain.name, "shop.example");
        assert_eq!(domain.service_chain, default_chain());
        assert_eq!(domain.session_timeout, Duration::from_secs(1200));
        assert!(domain.enabled);
    }

    #[test]
    fn explicit_chain_is_kept_in_order() {
        let config = DomainConfig {
            name: "api".into(),
            document_root: "/srv/api".into(),
            service_chain: vec![ServiceId::MAP_RESOURCE_PATH, ServiceId::LOAD_RESOURCE],
            ..DomainConfig::default()
        };
        let domain = Domain::from_config(&config);
        assert_eq!(
            domain.service_chain,
            vec![ServiceId::MAP_RESOURCE_PATH, ServiceId::LOAD_RESOURCE]
        );
        assert_eq!(domain.to_config(), config);
    }

    #[test]
    fn matches_name_and_aliases() {
        let mut domain = test_domain("shop.example", "/srv/shop");
        domain.aliases = vec!["www.shop.example".into()];
        assert!(domain.matches_host("shop.example"));
        assert!(domain.matches_host("www.shop.example"));
        assert!(!domain.matches_host("other.example"));
    }
}
