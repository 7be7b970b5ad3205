//! Published set of domains with Host resolution.
//!
//! Readers load the current snapshot without locking; every mutation builds a
//! new snapshot and swaps it in.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::ServerConfig;
use crate::domain::Domain;

#[derive(Debug, Default)]
struct DomainSet {
    domains: Vec<Arc<Domain>>,
    default_domain: Option<String>,
}

impl DomainSet {
    fn find(&self, name: &str) -> Option<&Arc<Domain>> {
        self.domains.iter().find(|d| d.name == name)
    }
}

/// Snapshot-swapped domain registry.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    current: ArcSwap<DomainSet>,
}

impl DomainRegistry {
    pub fn new(domains: Vec<Domain>, default_domain: Option<String>) -> Self {
        let registry = Self::default();
        registry.replace_all(domains, default_domain);
        registry
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.domains.iter().map(Domain::from_config).collect(),
            config.default_domain.clone(),
        )
    }

    /// Resolve a Host header value to a domain.
    ///
    /// Matches names and aliases case-insensitively, falling back to the
    /// default domain when one is configured.
    pub fn resolve(&self, host: Option<&str>) -> Option<Arc<Domain>> {
        let set = self.current.load();
        host.map(|h| h.to_ascii_lowercase())
            .and_then(|host| set.domains.iter().find(|d| d.matches_host(&host)).cloned())
            .or_else(|| {
                set.default_domain
                    .as_deref()
                    .and_then(|name| set.find(&name.to_ascii_lowercase()).cloned())
            })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Domain>> {
        self.current.load().find(&name.to_ascii_lowercase()).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Domain>> {
        self.current.load().domains.clone()
    }

    pub fn default_domain(&self) -> Option<String> {
        self.current.load().default_domain.clone()
    }

    pub fn replace_all(&self, domains: Vec<Domain>, default_domain: Option<String>) {
        let count = domains.len();
        self.current.store(Arc::new(DomainSet {
            domains: domains.into_iter().map(Arc::new).collect(),
            default_domain,
        }));
        tracing::info!(domains = count, "Domain set replaced");
    }

    /// Insert or replace the domain with the same name.
    pub fn upsert(&self, domain: Domain) {
        let domain = Arc::new(domain);
        self.current.rcu(|set| {
            let mut domains: Vec<_> = set
                .domains
                .iter()
                .filter(|d| d.name != domain.name)
                .cloned()
                .collect();
            domains.push(Arc::clone(&domain));
            DomainSet {
                domains,
                default_domain: set.default_domain.clone(),
            }
        });
    }

    /// Returns false when no domain has this name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let name = name.to_ascii_lowercase();
        let mut found = false;
        self.current.rcu(|set| {
            found = false;
            let domains = set
                .domains
                .iter()
                .map(|d| {
                    if d.name == name {
                        found = true;
                        Arc::new(Domain { enabled, ..Domain::clone(d) })
                    } else {
                        Arc::clone(d)
                    }
                })
                .collect();
            DomainSet {
                domains,
                default_domain: set.default_domain.clone(),
            }
        });
        if found {
            tracing::info!(domain = %name, enabled, "Domain state changed");
        }
        found
    }

    pub fn remove(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        let previous = self.current.rcu(|set| DomainSet {
            domains: set.domains.iter().filter(|d| d.name != name).cloned().collect(),
            default_domain: set.default_domain.clone(),
        });
        previous.find(&name).is_some()
    }
}
