//! Storage entity declarations and the resource registry.
//!
//! # Responsibility
//! - Describe each storage entity the adapter may address (table, key,
//!   soft-delete marker, relations).
//! - Resolve resource names to entity handles, validated once at startup.
//!
//! # Invariants
//! - Every identifier spliced into SQL matches `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - A built registry only holds entities whose table and declared columns
//!   exist, and aliases/relations that point at declared entities.
//! - `auto_increment` tables are keyed by their rowid alias.

use crate::db::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const DEFAULT_PRIMARY_KEY: &str = "id";

/// Returns whether `value` is safe to use as a SQL table/column name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// How new primary key values are produced on create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// SQLite assigns the integer rowid key.
    #[default]
    AutoIncrement,
    /// A v4 UUID string is generated unless the payload carries one.
    Uuid,
}

/// Many-to-one link from this entity to another one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationSchema {
    /// Column on this entity holding the related primary key.
    pub foreign_key: String,
    /// Name of the related entity.
    pub entity: String,
}

/// One addressable storage entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntitySchema {
    pub name: String,
    /// Backing table; defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub id_strategy: IdStrategy,
    /// Timestamp column set by soft delete. Rows with a non-null marker are
    /// excluded from every read and write.
    #[serde(default)]
    pub soft_delete_field: Option<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationSchema>,
    /// Relations attached to every row returned by read operations.
    #[serde(default)]
    pub expand: Vec<String>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: default_primary_key(),
            id_strategy: IdStrategy::default(),
            soft_delete_field: None,
            relations: BTreeMap::new(),
            expand: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    pub fn with_soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_field = Some(column.into());
        self
    }

    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            name.into(),
            RelationSchema {
                foreign_key: foreign_key.into(),
                entity: entity.into(),
            },
        );
        self
    }

    pub fn with_expand(mut self, relation: impl Into<String>) -> Self {
        self.expand.push(relation.into());
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(self.name.as_str())
    }

    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete_field.is_some()
    }
}

/// Startup-time registry validation failures.
#[derive(Debug)]
pub enum RegistryError {
    Db(DbError),
    DuplicateEntity(String),
    InvalidIdentifier { entity: String, value: String },
    MissingTable { entity: String, table: String },
    MissingColumn {
        entity: String,
        table: String,
        column: String,
    },
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },
    UnknownAliasTarget { resource: String, entity: String },
    UnknownExpandRelation { entity: String, relation: String },
    /// `auto_increment` entity whose key is not an `INTEGER PRIMARY KEY` column.
    KeyNotRowid {
        entity: String,
        table: String,
        column: String,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DuplicateEntity(name) => write!(f, "entity declared twice: {name}"),
            Self::InvalidIdentifier { entity, value } => {
                write!(f, "entity `{entity}` uses invalid identifier `{value}`")
            }
            Self::MissingTable { entity, table } => {
                write!(f, "entity `{entity}` table `{table}` does not exist")
            }
            Self::MissingColumn {
                entity,
                table,
                column,
            } => write!(
                f,
                "entity `{entity}` column `{column}` does not exist on table `{table}`"
            ),
            Self::UnknownRelationTarget {
                entity,
                relation,
                target,
            } => write!(
                f,
                "entity `{entity}` relation `{relation}` targets unknown entity `{target}`"
            ),
            Self::UnknownAliasTarget { resource, entity } => {
                write!(f, "resource `{resource}` maps to unknown entity `{entity}`")
            }
            Self::UnknownExpandRelation { entity, relation } => {
                write!(f, "entity `{entity}` expands undeclared relation `{relation}`")
            }
            Self::KeyNotRowid {
                entity,
                table,
                column,
            } => write!(
                f,
                "entity `{entity}` uses auto_increment but `{table}.{column}` is not an INTEGER PRIMARY KEY"
            ),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Resource name to storage entity resolution table.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, EntitySchema>,
    aliases: BTreeMap<String, String>,
}

impl EntityRegistry {
    /// Builds and eagerly validates the registry against the live schema.
    ///
    /// # Errors
    /// - Any invalid identifier, missing table/column, dangling relation or
    ///   dangling alias aborts the build.
    pub fn build(
        conn: &Connection,
        entities: impl IntoIterator<Item = EntitySchema>,
        aliases: BTreeMap<String, String>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            entities: BTreeMap::new(),
            aliases,
        };
        for entity in entities {
            if registry.entities.contains_key(&entity.name) {
                return Err(RegistryError::DuplicateEntity(entity.name));
            }
            registry.entities.insert(entity.name.clone(), entity);
        }

        for entity in registry.entities.values() {
            validate_identifiers(entity)?;
            validate_columns(conn, entity)?;
            for (relation, schema) in &entity.relations {
                if !registry.entities.contains_key(&schema.entity) {
                    return Err(RegistryError::UnknownRelationTarget {
                        entity: entity.name.clone(),
                        relation: relation.clone(),
                        target: schema.entity.clone(),
                    });
                }
            }
            if let Some(relation) = entity
                .expand
                .iter()
                .find(|relation| !entity.relations.contains_key(*relation))
            {
                return Err(RegistryError::UnknownExpandRelation {
                    entity: entity.name.clone(),
                    relation: relation.clone(),
                });
            }
        }

        for (resource, entity) in &registry.aliases {
            if !registry.entities.contains_key(entity) {
                return Err(RegistryError::UnknownAliasTarget {
                    resource: resource.clone(),
                    entity: entity.clone(),
                });
            }
        }

        log::info!(
            "event=registry_build module=repo status=ok entities={} aliases={}",
            registry.entities.len(),
            registry.aliases.len()
        );
        Ok(registry)
    }

    /// Resolves a model or resource name: entity names first, then aliases.
    pub fn resolve(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|entity| self.entities.get(entity))
        })
    }

    /// Looks up a declared entity by its own name only.
    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn validate_identifiers(entity: &EntitySchema) -> Result<(), RegistryError> {
    let mut names = vec![entity.table_name(), entity.primary_key.as_str()];
    names.extend(entity.soft_delete_field.as_deref());
    for (relation, schema) in &entity.relations {
        names.push(relation.as_str());
        names.push(schema.foreign_key.as_str());
    }

    match names.into_iter().find(|name| !is_valid_identifier(name)) {
        Some(invalid) => Err(RegistryError::InvalidIdentifier {
            entity: entity.name.clone(),
            value: invalid.to_string(),
        }),
        None => Ok(()),
    }
}

/// One row of `PRAGMA table_info`.
struct ColumnInfo {
    name: String,
    decl_type: String,
    /// 1-based position in the primary key, 0 when not part of it.
    pk: i64,
}

fn validate_columns(conn: &Connection, entity: &EntitySchema) -> Result<(), RegistryError> {
    let table = entity.table_name();
    let Some(kind) = schema_object_kind(conn, table)? else {
        return Err(RegistryError::MissingTable {
            entity: entity.name.clone(),
            table: table.to_string(),
        });
    };

    let mut required = vec![entity.primary_key.as_str()];
    required.extend(entity.soft_delete_field.as_deref());
    required.extend(
        entity
            .relations
            .values()
            .map(|relation| relation.foreign_key.as_str()),
    );

    let columns = table_columns(conn, table)?;
    for column in required {
        if !columns.iter().any(|existing| existing.name == column) {
            return Err(RegistryError::MissingColumn {
                entity: entity.name.clone(),
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }

    // Views have no rowid; only tables can hand back `last_insert_rowid`.
    if entity.id_strategy == IdStrategy::AutoIncrement
        && kind == "table"
        && !is_rowid_alias(&columns, &entity.primary_key)
    {
        return Err(RegistryError::KeyNotRowid {
            entity: entity.name.clone(),
            table: table.to_string(),
            column: entity.primary_key.clone(),
        });
    }
    Ok(())
}

/// SQLite only aliases the rowid for a sole `INTEGER PRIMARY KEY` column.
fn is_rowid_alias(columns: &[ColumnInfo], primary_key: &str) -> bool {
    let mut key_columns = columns.iter().filter(|column| column.pk > 0);
    match (key_columns.next(), key_columns.next()) {
        (Some(key), None) => key.name == primary_key && key.decl_type.eq_ignore_ascii_case("INTEGER"),
        _ => false,
    }
}

/// Returns `table` or `view` for an existing schema object, `None` otherwise.
fn schema_object_kind(conn: &Connection, name: &str) -> Result<Option<String>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT type
         FROM sqlite_master
         WHERE type IN ('table', 'view') AND name = ?1
         LIMIT 1;",
    )?;
    let mut rows = stmt.query([name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, RegistryError> {
    // `table` already passed identifier validation.
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(ColumnInfo {
            name: row.get(1)?,
            decl_type: row.get(2)?,
            pk: row.get(5)?,
        });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_identifier, EntityRegistry, EntitySchema, IdStrategy, RegistryError};
    use rusqlite::Connection;
    use std::collections::BTreeMap;

    fn conn_with_posts() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                title TEXT,
                author_id INTEGER,
                deleted_at INTEGER
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn identifier_pattern_rejects_sql_fragments() {
        assert!(is_valid_identifier("author_id"));
        assert!(is_valid_identifier("_hidden"));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier("name; DROP TABLE posts"));
        assert!(!is_valid_identifier("a.b"));
    }

    #[test]
    fn resolve_prefers_entities_then_aliases() {
        let conn = conn_with_posts();
        let registry = EntityRegistry::build(
            &conn,
            [EntitySchema::new("users"), EntitySchema::new("posts")],
            BTreeMap::from([("articles".to_string(), "posts".to_string())]),
        )
        .unwrap();

        assert_eq!(registry.resolve("posts").unwrap().name, "posts");
        assert_eq!(registry.resolve("articles").unwrap().name, "posts");
        assert!(registry.resolve("comments").is_none());
        assert!(registry.entity("articles").is_none());
    }

    #[test]
    fn build_rejects_missing_soft_delete_column() {
        let conn = conn_with_posts();
        let err = EntityRegistry::build(
            &conn,
            [EntitySchema::new("users").with_soft_delete("deleted_at")],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::MissingColumn { column, .. } if column == "deleted_at"));
    }

    #[test]
    fn build_rejects_dangling_relation_and_alias() {
        let conn = conn_with_posts();
        let err = EntityRegistry::build(
            &conn,
            [EntitySchema::new("posts").with_relation("author", "author_id", "users")],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRelationTarget { .. }));

        let err = EntityRegistry::build(
            &conn,
            [EntitySchema::new("posts")],
            BTreeMap::from([("articles".to_string(), "post".to_string())]),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAliasTarget { .. }));
    }

    #[test]
    fn build_rejects_expanding_undeclared_relation() {
        let conn = conn_with_posts();
        let err = EntityRegistry::build(
            &conn,
            [EntitySchema::new("posts").with_expand("author")],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownExpandRelation { .. }));
    }

    #[test]
    fn build_rejects_missing_table() {
        let conn = conn_with_posts();
        let err =
            EntityRegistry::build(&conn, [EntitySchema::new("comments")], BTreeMap::new())
                .unwrap_err();
        assert!(matches!(err, RegistryError::MissingTable { table, .. } if table == "comments"));
    }

    #[test]
    fn build_requires_rowid_key_for_auto_increment() {
        let conn = conn_with_posts();
        conn.execute_batch(
            "CREATE TABLE tags (id TEXT PRIMARY KEY, label TEXT);
             CREATE VIEW post_titles AS SELECT id, title FROM posts;",
        )
        .unwrap();

        let err = EntityRegistry::build(&conn, [EntitySchema::new("tags")], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotRowid { column, .. } if column == "id"));

        let registry = EntityRegistry::build(
            &conn,
            [
                EntitySchema::new("tags").with_id_strategy(IdStrategy::Uuid),
                EntitySchema::new("post_titles"),
            ],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
    }
}
