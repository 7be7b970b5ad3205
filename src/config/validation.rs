//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (chains name known services, default domain exists)
//! - Validate value ranges (capacity and limits > 0, addresses parse)
//! - Detect conflicting host names
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted, at startup and on reload

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use crate::chain::services::builtin_ids;
use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("domain #{index} has an empty name")]
    EmptyDomainName { index: usize },
    #[error("domain {domain} has an empty document_root")]
    EmptyDocumentRoot { domain: String },
    #[error("host name {host} is used by more than one domain")]
    DuplicateHost { host: String },
    #[error("domain {domain} names unknown service {service}")]
    UnknownService { domain: String, service: String },
    #[error("domain {domain} has an invalid forward_url: {reason}")]
    InvalidForwardUrl { domain: String, reason: String },
    #[error("default_domain {0} is not a configured domain")]
    UnknownDefaultDomain(String),
    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("blacklist entry {0} is not an IP address")]
    InvalidBlacklistAddress(String),
    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyAdminKey,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if let Some(tls) = &config.listener.tls {
        check_address(&mut errors, "listener.tls.bind_address", &tls.bind_address);
    }
    check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyAdminKey);
    }
    check_address(
        &mut errors,
        "observability.metrics_address",
        &config.observability.metrics_address,
    );

    for (field, value) in [
        ("listener.max_connections", config.listener.max_connections),
        ("limits.max_request_size", config.limits.max_request_size),
        ("limits.max_header_count", config.limits.max_header_count),
        ("limits.max_request_line", config.limits.max_request_line),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    for (field, value) in [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.keep_alive_secs", config.timeouts.keep_alive_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("sessions.sweep_interval_secs", config.sessions.sweep_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let known = builtin_ids();
    let mut hosts = HashSet::new();
    for (index, domain) in config.domains.iter().enumerate() {
        if domain.name.trim().is_empty() {
            errors.push(ValidationError::EmptyDomainName { index });
            continue;
        }
        if domain.document_root.trim().is_empty() {
            errors.push(ValidationError::EmptyDocumentRoot {
                domain: domain.name.clone(),
            });
        }
        for host in std::iter::once(&domain.name).chain(&domain.aliases) {
            if !hosts.insert(host.to_ascii_lowercase()) {
                errors.push(ValidationError::DuplicateHost { host: host.clone() });
            }
        }
        for service in &domain.service_chain {
            if !known.contains(service) {
                errors.push(ValidationError::UnknownService {
                    domain: domain.name.clone(),
                    service: service.to_string(),
                });
            }
        }
        if let Some(forward) = &domain.forward_url {
            if let Err(e) = url::Url::parse(forward) {
                errors.push(ValidationError::InvalidForwardUrl {
                    domain: domain.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if let Some(default) = &config.default_domain {
        let exists = config
            .domains
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(default));
        if !exists {
            errors.push(ValidationError::UnknownDefaultDomain(default.clone()));
        }
    }

    for entry in &config.blacklist {
        if entry.address.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidBlacklistAddress(entry.address.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ServiceId;
    use crate::config::schema::{BlacklistEntry, DomainConfig};
    use crate::security::BlacklistAction;

    fn domain(name: &str) -> DomainConfig {
        DomainConfig {
            name: name.into(),
            document_root: "/srv/www".into(),
            ..DomainConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn duplicate_hosts_are_rejected_case_insensitively() {
        let mut config = ServerConfig::default();
        let mut shop = domain("shop.example");
        shop.aliases = vec!["www.example".into()];
        config.domains = vec![shop, domain("WWW.example")];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateHost {
                host: "WWW.example".into()
            }]
        );
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.max_connections = 0;
        config.timeouts.keep_alive_secs = 0;
        let mut bad = domain("bad.example");
        bad.forward_url = Some("::nope".into());
        bad.service_chain = vec![ServiceId::LOAD_RESOURCE, ServiceId::from("frobnicate")];
        config.domains = vec![bad, domain("")];
        config.blacklist = vec![BlacklistEntry {
            address: "nowhere".into(),
            action: BlacklistAction::Block,
        }];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: "not-an-address".into()
        }));
        assert!(errors.contains(&ValidationError::Zero {
            field: "listener.max_connections"
        }));
        assert!(errors.contains(&ValidationError::Zero {
            field: "timeouts.keep_alive_secs"
        }));
        assert!(errors.contains(&ValidationError::UnknownService {
            domain: "bad.example".into(),
            service: "frobnicate".into()
        }));
        assert!(errors.contains(&ValidationError::EmptyDomainName { index: 1 }));
        assert!(errors.contains(&ValidationError::InvalidBlacklistAddress("nowhere".into())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidForwardUrl { .. })));
        assert_eq!(errors.len(), 7);
    }

    #[test]
    fn enabled_admin_api_needs_a_key() {
        let mut config = ServerConfig::default();
        config.admin.api_key = "  ".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.admin.enabled = true;
        assert_eq!(validate_config(&config), Err(vec![ValidationError::EmptyAdminKey]));

        config.admin.api_key = "secret".into();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
