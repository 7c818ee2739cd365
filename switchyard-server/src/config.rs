//! Runtime configuration: CLI flags plus an optional YAML schema file.
//!
//! ```yaml
//! allowCommandSubscriptions: false
//! schemaTypes:
//!   form:
//!     allowSubscribe: true
//!     persist: true
//!     retain: 500
//!   order: {}
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;

/// Names taken by the built-in type and the introspection routes.
pub const RESERVED_SCHEMA_TYPES: &[&str] = &["command", "capabilities", "subscriptions", "healthz"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read schema file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Schema type name is reserved: {0}")]
    ReservedSchemaType(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// One schema type as declared in the schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaTypeEntry {
    /// Honor `subscribe` commands for this type
    pub allow_subscribe: bool,
    /// Keep recent documents so new subscribers can hydrate
    pub persist: bool,
    /// Expose `POST /{schemaType}`
    pub webhook: bool,
    /// How many recent documents a persisted type keeps
    pub retain: usize,
}

impl Default for SchemaTypeEntry {
    fn default() -> Self {
        Self {
            allow_subscribe: true,
            persist: false,
            webhook: true,
            retain: default_retain(),
        }
    }
}

fn default_retain() -> usize {
    1000
}

/// Top-level shape of the schema file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaFile {
    pub allow_command_subscriptions: bool,
    pub schema_types: BTreeMap<String, SchemaTypeEntry>,
}

impl SchemaFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// Runtime configuration derived from CLI/env and the schema file.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub name: String,
    pub listen_addr: String,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub delivery_timeout: Duration,
    pub subscription_ttl: Option<Duration>,
    pub allow_command_subscriptions: bool,
    pub schema_types: BTreeMap<String, SchemaTypeEntry>,
}

impl RelayConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.schemas {
            Some(path) => SchemaFile::from_file(path)?,
            None => SchemaFile::default(),
        };

        let mut schema_types = file.schema_types;
        for name in &cli.schema_types {
            schema_types.entry(name.clone()).or_default();
        }

        if cli.delivery_timeout_secs == 0 {
            return Err(ConfigError::InvalidField {
                field: "delivery timeout".into(),
                reason: "must be at least one second".into(),
            });
        }

        let config = Self {
            name: cli.name.clone(),
            listen_addr: cli.listen_addr.clone(),
            endpoint: cli.endpoint.clone(),
            token: cli.token.clone(),
            delivery_timeout: Duration::from_secs(cli.delivery_timeout_secs),
            subscription_ttl: cli.subscription_ttl_secs.map(Duration::from_secs),
            allow_command_subscriptions: cli.allow_command_subscriptions
                || file.allow_command_subscriptions,
            schema_types,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidField {
                    field: "endpoint".into(),
                    reason: format!("expected an http(s) URL, got {endpoint:?}"),
                });
            }
        }

        for (name, entry) in &self.schema_types {
            if RESERVED_SCHEMA_TYPES.contains(&name.as_str()) {
                return Err(ConfigError::ReservedSchemaType(name.clone()));
            }
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::InvalidField {
                    field: "schema type".into(),
                    reason: format!("{name:?} is not a valid path segment"),
                });
            }
            if entry.persist && entry.retain == 0 {
                return Err(ConfigError::InvalidField {
                    field: format!("{name}.retain"),
                    reason: "persisted types must retain at least one document".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["switchyard"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_schema_file_defaults() {
        let file = SchemaFile::from_yaml(
            r#"
schemaTypes:
  form:
    persist: true
    retain: 5
  order: {}
"#,
        )
        .unwrap();

        assert!(!file.allow_command_subscriptions);
        let form = &file.schema_types["form"];
        assert!(form.allow_subscribe);
        assert!(form.persist);
        assert!(form.webhook);
        assert_eq!(form.retain, 5);
        assert_eq!(file.schema_types["order"], SchemaTypeEntry::default());
    }

    #[test]
    fn test_empty_schema_file() {
        assert_eq!(SchemaFile::from_yaml("  \n").unwrap(), SchemaFile::default());
    }

    #[test]
    fn test_from_cli_merges_file_and_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "allowCommandSubscriptions: true\nschemaTypes:\n  form:\n    allowSubscribe: false"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = RelayConfig::from_cli(&cli(&[
            "--schemas",
            path,
            "--schema-type",
            "order",
            "--schema-type",
            "form",
            "--subscription-ttl-secs",
            "60",
        ]))
        .unwrap();

        assert!(config.allow_command_subscriptions);
        assert!(!config.schema_types["form"].allow_subscribe);
        assert!(config.schema_types["order"].allow_subscribe);
        assert_eq!(config.subscription_ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.listen_addr, "127.0.0.1:8790");
    }

    #[test]
    fn test_reserved_names_rejected() {
        let err = RelayConfig::from_cli(&cli(&["--schema-type", "subscriptions"])).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedSchemaType(name) if name == "subscriptions"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RelayConfig::from_cli(&cli(&["--endpoint", "localhost:9000"])),
            Err(ConfigError::InvalidField { .. })
        ));
        assert!(matches!(
            RelayConfig::from_cli(&cli(&["--delivery-timeout-secs", "0"])),
            Err(ConfigError::InvalidField { .. })
        ));
        assert!(matches!(
            RelayConfig::from_cli(&cli(&["--schema-type", "a/b"])),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_missing_schema_file() {
        let err = RelayConfig::from_cli(&cli(&["--schemas", "/nonexistent/schemas.yml"])).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
