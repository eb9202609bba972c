//! Storage capability contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Expose the six storage operations the handlers need for one entity.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Soft-deleted rows (non-null marker) are invisible to `find`,
//!   `find_unique`, `count`, `update` and `delete`.
//! - `update` and `delete` report `NotFound` when no visible row matches.
//! - List ordering always ends with the primary key for stable pages.

use crate::db::DbError;
use crate::model::envelope::{Record, RecordId, SortOrder};
use crate::model::predicate::PredicateTree;
use crate::repo::entity::{EntityRegistry, EntitySchema, IdStrategy};
use crate::repo::sql::{
    build_filter, default_scope_clause, json_to_sql, placeholders, quote_ident, row_to_record,
    SqlFilter,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-layer error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// No visible row has this primary key.
    NotFound { entity: String, id: RecordId },
    /// Request cannot be expressed against this entity (bad field, relation).
    InvalidQuery(String),
    /// Stored value cannot be represented in a record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidQuery(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read request for `EntityStore::find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: PredicateTree,
    pub order_by: Option<(String, SortOrder)>,
    pub skip: u64,
    pub take: Option<u64>,
}

impl FindQuery {
    pub fn filtered(filter: PredicateTree) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// Storage operations for one resolved entity.
pub trait EntityStore {
    fn find(&self, query: &FindQuery) -> RepoResult<Vec<Record>>;
    fn find_unique(&self, id: &RecordId) -> RepoResult<Option<Record>>;
    fn count(&self, filter: &PredicateTree) -> RepoResult<u64>;
    fn create(&self, data: &Record) -> RepoResult<Record>;
    fn update(&self, id: &RecordId, data: &Record) -> RepoResult<Record>;
    fn delete(&self, id: &RecordId) -> RepoResult<Record>;
}

/// Hands out an `EntityStore` for a resolved entity.
pub trait Storage {
    fn entity<'s>(
        &'s self,
        entity: &'s EntitySchema,
        registry: &'s EntityRegistry,
    ) -> Box<dyn EntityStore + 's>;
}

/// SQLite-backed storage over one connection.
pub struct SqliteStorage<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStorage<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl Storage for SqliteStorage<'_> {
    fn entity<'s>(
        &'s self,
        entity: &'s EntitySchema,
        registry: &'s EntityRegistry,
    ) -> Box<dyn EntityStore + 's> {
        Box::new(SqliteEntityStore::new(self.conn, entity, registry))
    }
}

/// SQLite-backed store for one entity table.
pub struct SqliteEntityStore<'a> {
    conn: &'a Connection,
    entity: &'a EntitySchema,
    registry: &'a EntityRegistry,
}

impl<'a> SqliteEntityStore<'a> {
    pub fn new(conn: &'a Connection, entity: &'a EntitySchema, registry: &'a EntityRegistry) -> Self {
        Self {
            conn,
            entity,
            registry,
        }
    }

    fn table(&self) -> RepoResult<String> {
        quote_ident(self.entity.table_name())
    }

    fn primary_key(&self) -> RepoResult<String> {
        quote_ident(&self.entity.primary_key)
    }

    fn not_found(&self, id: &RecordId) -> RepoError {
        RepoError::NotFound {
            entity: self.entity.name.clone(),
            id: id.clone(),
        }
    }

    /// Key filter, optionally restricted to rows visible under the default scope.
    fn id_filter(&self, id: &RecordId, scoped: bool) -> RepoResult<SqlFilter> {
        let mut filter = SqlFilter::default();
        filter.push_clause(format!("{} = ?", self.primary_key()?));
        filter.bind_values.push(json_to_sql(&id.to_value()));
        if scoped {
            if let Some(scope) = default_scope_clause(self.entity)? {
                filter.push_clause(scope);
            }
        }
        Ok(filter)
    }

    fn select(&self, filter: &SqlFilter, tail: &str, extra: Vec<SqlValue>) -> RepoResult<Vec<Record>> {
        let sql = format!("SELECT * FROM {}{}{tail};", self.table()?, filter.where_sql());
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let binds = filter.bind_values.iter().cloned().chain(extra);
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row, &columns)?);
        }
        Ok(records)
    }

    fn select_by_id(&self, id: &RecordId, scoped: bool) -> RepoResult<Option<Record>> {
        let filter = self.id_filter(id, scoped)?;
        Ok(self.select(&filter, " LIMIT 1", Vec::new())?.into_iter().next())
    }

    fn order_sql(&self, order_by: Option<&(String, SortOrder)>) -> RepoResult<String> {
        let primary_key = self.primary_key()?;
        let mut terms = Vec::new();
        if let Some((field, order)) = order_by {
            if *field != self.entity.primary_key {
                terms.push(format!("{} {}", quote_ident(field)?, direction_sql(*order)));
            } else if *order == SortOrder::Desc {
                return Ok(format!(" ORDER BY {primary_key} DESC"));
            }
        }
        terms.push(format!("{primary_key} ASC"));
        Ok(format!(" ORDER BY {}", terms.join(", ")))
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn find(&self, query: &FindQuery) -> RepoResult<Vec<Record>> {
        let filter = build_filter(self.entity, self.registry, &query.filter)?;
        let mut tail = self.order_sql(query.order_by.as_ref())?;
        let mut extra = Vec::new();

        match query.take {
            Some(take) => {
                tail.push_str(" LIMIT ? OFFSET ?");
                extra.push(SqlValue::Integer(to_sql_int(take)));
                extra.push(SqlValue::Integer(to_sql_int(query.skip)));
            }
            None if query.skip > 0 => {
                tail.push_str(" LIMIT -1 OFFSET ?");
                extra.push(SqlValue::Integer(to_sql_int(query.skip)));
            }
            None => {}
        }

        self.select(&filter, &tail, extra)
    }

    fn find_unique(&self, id: &RecordId) -> RepoResult<Option<Record>> {
        self.select_by_id(id, true)
    }

    fn count(&self, filter: &PredicateTree) -> RepoResult<u64> {
        let filter = build_filter(self.entity, self.registry, filter)?;
        let sql = format!("SELECT COUNT(*) FROM {}{};", self.table()?, filter.where_sql());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter.bind_values.iter()), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn create(&self, data: &Record) -> RepoResult<Record> {
        let mut data = data.clone();
        if self.entity.id_strategy == IdStrategy::Uuid
            && data
                .get(&self.entity.primary_key)
                .map_or(true, serde_json::Value::is_null)
        {
            data.insert(
                self.entity.primary_key.clone(),
                serde_json::Value::String(Uuid::new_v4().to_string()),
            );
        }

        let table = self.table()?;
        if data.is_empty() {
            self.conn
                .execute(&format!("INSERT INTO {table} DEFAULT VALUES;"), [])?;
        } else {
            let columns = data
                .keys()
                .map(|column| quote_ident(column))
                .collect::<RepoResult<Vec<_>>>()?;
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                placeholders(columns.len())
            );
            self.conn
                .execute(&sql, params_from_iter(data.values().map(json_to_sql)))?;
        }

        let id = match data
            .get(&self.entity.primary_key)
            .and_then(RecordId::from_value)
        {
            Some(id) => id,
            None => RecordId::Int(self.conn.last_insert_rowid()),
        };
        self.select_by_id(&id, false)?
            .ok_or_else(|| RepoError::InvalidData(format!("created row {id} is not readable")))
    }

    fn update(&self, id: &RecordId, data: &Record) -> RepoResult<Record> {
        if data.is_empty() {
            return self.find_unique(id)?.ok_or_else(|| self.not_found(id));
        }

        let assignments = data
            .keys()
            .map(|column| Ok(format!("{} = ?", quote_ident(column)?)))
            .collect::<RepoResult<Vec<_>>>()?;
        let filter = self.id_filter(id, true)?;
        let sql = format!(
            "UPDATE {} SET {}{};",
            self.table()?,
            assignments.join(", "),
            filter.where_sql()
        );
        let binds = data
            .values()
            .map(json_to_sql)
            .chain(filter.bind_values.iter().cloned());
        let changed = self.conn.execute(&sql, params_from_iter(binds))?;
        if changed == 0 {
            return Err(self.not_found(id));
        }

        // Key may have been changed by the payload itself.
        let current_id = data
            .get(&self.entity.primary_key)
            .and_then(RecordId::from_value)
            .unwrap_or_else(|| id.clone());
        self.select_by_id(&current_id, false)?
            .ok_or_else(|| self.not_found(&current_id))
    }

    fn delete(&self, id: &RecordId) -> RepoResult<Record> {
        let snapshot = self.find_unique(id)?.ok_or_else(|| self.not_found(id))?;
        let filter = self.id_filter(id, true)?;
        let sql = format!("DELETE FROM {}{};", self.table()?, filter.where_sql());
        let changed = self
            .conn
            .execute(&sql, params_from_iter(filter.bind_values.iter()))?;
        if changed == 0 {
            return Err(self.not_found(id));
        }
        Ok(snapshot)
    }
}

fn direction_sql(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
