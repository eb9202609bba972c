//! Adapter configuration.
//!
//! # Responsibility
//! - Parse the JSON document describing entities, resource aliases, handler
//!   options, audit switches and logging settings.
//! - Turn it into the validated pieces the dispatcher is built from.
//!
//! # Invariants
//! - Unknown keys are rejected so typos fail at startup.
//! - Missing sections take their documented defaults.

use crate::repo::entity::{EntityRegistry, EntitySchema, RegistryError};
use crate::service::audit::AuditOptions;
use crate::service::options::{HandlerOptions, ListOptions, WriteOptions};
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

/// Logging section; both values are optional so the CLI can fill gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// Absolute directory for rolling log files; stderr when unset.
    pub dir: Option<String>,
}

/// Full adapter configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    pub entities: Vec<EntitySchema>,
    /// Resource name to entity name.
    pub resources: BTreeMap<String, String>,
    pub list: ListOptions,
    pub create: WriteOptions,
    pub update: WriteOptions,
    pub audit: AuditOptions,
    pub logging: LoggingConfig,
}

impl AdapterConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            list: self.list.clone(),
            create: self.create.clone(),
            update: self.update.clone(),
        }
    }

    /// Builds the entity registry, validating it against `conn`.
    pub fn build_registry(&self, conn: &Connection) -> Result<EntityRegistry, RegistryError> {
        EntityRegistry::build(conn, self.entities.iter().cloned(), self.resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterConfig, ConfigError};
    use crate::model::envelope::OperationKind;
    use crate::repo::entity::IdStrategy;

    #[test]
    fn parses_full_document() {
        let config = AdapterConfig::from_json_str(
            r#"{
                "entities": [
                    {
                        "name": "Post",
                        "table": "posts",
                        "soft_delete_field": "deleted_at",
                        "relations": {"author": {"foreign_key": "author_id", "entity": "User"}},
                        "expand": ["author"]
                    },
                    {"name": "User", "table": "users", "id_strategy": "uuid"}
                ],
                "resources": {"posts": "Post", "users": "User"},
                "list": {"default_per_page": 10, "max_per_page": 100},
                "update": {"skip_fields": ["created_at"]},
                "audit": {"enabled": true, "operations": ["create", "deleteMany"]},
                "logging": {"level": "debug"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.entities.len(), 2);
        assert_eq!(config.entities[0].table_name(), "posts");
        assert_eq!(config.entities[0].primary_key, "id");
        assert_eq!(config.entities[1].id_strategy, IdStrategy::Uuid);
        assert_eq!(config.list.max_per_page, Some(100));
        assert!(config.update.skip_fields.contains("created_at"));
        assert!(config.audit.audits(OperationKind::DeleteMany));
        assert!(!config.audit.audits(OperationKind::Update));
        assert_eq!(config.handler_options().list.default_per_page, 10);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AdapterConfig::from_json_str("{}").unwrap();
        assert!(config.entities.is_empty());
        assert_eq!(config.list.default_per_page, 25);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = AdapterConfig::from_json_str(r#"{"entitys": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AdapterConfig::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
