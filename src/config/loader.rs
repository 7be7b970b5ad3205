//! Configuration loading from disk, and domain persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::schema::{DomainConfig, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and persistence.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Domain set as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainsFile {
    pub default_domain: Option<String>,
    pub domains: Vec<DomainConfig>,
}

impl DomainsFile {
    /// Replace the configured domain set with the persisted one.
    pub fn apply(self, config: &mut ServerConfig) {
        config.default_domain = self.default_domain;
        config.domains = self.domains;
    }
}

/// Read the persisted domain set. A missing file is `Ok(None)`.
pub fn load_domains(path: &Path) -> Result<Option<DomainsFile>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DomainsFile = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), domains = file.domains.len(), "Loaded persisted domains");
    Ok(Some(file))
}

/// Write the domain set, replacing the file atomically.
pub fn save_domains(path: &Path, domains: &DomainsFile) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(domains)?;
    let tmp = path.with_extension("tmp");
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, content).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    tracing::info!(path = %path.display(), domains = domains.domains.len(), "Saved domains");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ServiceId;

    #[test]
    fn invalid_config_reports_every_error() {
        let err = parse_config(
            r#"
            default_domain = "missing.example"

            [[domains]]
            name = "shop.example"
            document_root = "/srv/shop"
            service_chain = ["no-such-service"]
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2, "{:?}", errors),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/vhost.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn domains_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.toml");
        assert_eq!(load_domains(&path).unwrap(), None);

        let file = DomainsFile {
            default_domain: Some("shop.example".into()),
            domains: vec![DomainConfig {
                name: "shop.example".into(),
                document_root: "/srv/shop".into(),
                enabled: false,
                service_chain: vec![ServiceId::LOAD_RESOURCE, ServiceId::TRANSFER_RESPONSE],
                ..DomainConfig::default()
            }],
        };
        save_domains(&path, &file).unwrap();
        assert_eq!(load_domains(&path).unwrap(), Some(file.clone()));

        let mut config = ServerConfig::default();
        file.apply(&mut config);
        assert_eq!(config.default_domain.as_deref(), Some("shop.example"));
        assert!(!config.domains[0].enabled);
    }
}
