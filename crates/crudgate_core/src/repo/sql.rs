//! Predicate tree to SQL translation and JSON/SQLite value mapping.
//!
//! # Invariants
//! - Values are always bound as parameters, never spliced into SQL text.
//! - Identifiers are validated and double-quoted before they reach SQL text.
//! - Clauses of one tree are combined with `AND`.

use crate::model::envelope::Record;
use crate::model::predicate::{Predicate, PredicateTree, RangeOp};
use crate::repo::entity::{is_valid_identifier, EntityRegistry, EntitySchema};
use crate::repo::entity_store::{RepoError, RepoResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::{Number, Value};

const MATCH_NOTHING: &str = "0 = 1";

/// `WHERE` fragments plus their bound values, in placeholder order.
#[derive(Debug, Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    pub(crate) bind_values: Vec<SqlValue>,
}

impl SqlFilter {
    /// Renders ` WHERE a AND b`, or an empty string when there is no clause.
    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn push_clause(&mut self, clause: String) {
        self.clauses.push(clause);
    }
}

/// Validates and double-quotes one identifier.
pub(crate) fn quote_ident(name: &str) -> RepoResult<String> {
    if is_valid_identifier(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(RepoError::InvalidQuery(format!(
            "invalid field name `{name}`"
        )))
    }
}

/// Clause that hides soft-deleted rows, if the entity uses soft delete.
pub(crate) fn default_scope_clause(entity: &EntitySchema) -> RepoResult<Option<String>> {
    entity
        .soft_delete_field
        .as_deref()
        .map(|marker| Ok(format!("{} IS NULL", quote_ident(marker)?)))
        .transpose()
}

/// Translates `tree` into a filter on `entity`, including its default scope.
pub(crate) fn build_filter(
    entity: &EntitySchema,
    registry: &EntityRegistry,
    tree: &PredicateTree,
) -> RepoResult<SqlFilter> {
    let mut filter = SqlFilter::default();
    for (path, predicate) in tree.iter() {
        let clause = path_clause(entity, registry, path, predicate, &mut filter.bind_values)?;
        filter.push_clause(clause);
    }
    if let Some(scope) = default_scope_clause(entity)? {
        filter.push_clause(scope);
    }
    Ok(filter)
}

fn path_clause(
    entity: &EntitySchema,
    registry: &EntityRegistry,
    path: &str,
    predicate: &Predicate,
    bind_values: &mut Vec<SqlValue>,
) -> RepoResult<String> {
    let Some((relation_name, rest)) = path.split_once('.') else {
        return column_clause(&quote_ident(path)?, predicate, bind_values);
    };

    let relation = entity.relations.get(relation_name).ok_or_else(|| {
        RepoError::InvalidQuery(format!(
            "unknown relation `{relation_name}` on `{}`",
            entity.name
        ))
    })?;
    let related = registry.entity(&relation.entity).ok_or_else(|| {
        RepoError::InvalidQuery(format!("unknown entity `{}`", relation.entity))
    })?;

    let mut inner = path_clause(related, registry, rest, predicate, bind_values)?;
    if let Some(scope) = default_scope_clause(related)? {
        inner = format!("{inner} AND {scope}");
    }
    Ok(format!(
        "{} IN (SELECT {} FROM {} WHERE {inner})",
        quote_ident(&relation.foreign_key)?,
        quote_ident(&related.primary_key)?,
        quote_ident(related.table_name())?,
    ))
}

fn column_clause(
    column: &str,
    predicate: &Predicate,
    bind_values: &mut Vec<SqlValue>,
) -> RepoResult<String> {
    let clause = match predicate {
        Predicate::Equals(Value::Null) => format!("{column} IS NULL"),
        Predicate::Equals(Value::Array(values)) | Predicate::In { values } => {
            in_clause(column, values, bind_values)
        }
        Predicate::Equals(value) => {
            bind_values.push(json_to_sql(value));
            format!("{column} = ?")
        }
        Predicate::Range(bounds) => {
            if bounds.is_empty() {
                return Err(RepoError::InvalidQuery(format!(
                    "empty range on {column}"
                )));
            }
            bounds
                .iter()
                .map(|(op, value)| {
                    bind_values.push(json_to_sql(value));
                    format!("{column} {} ?", range_sql(*op))
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        }
        Predicate::Contains { contains } => {
            bind_values.push(SqlValue::Text(format!("%{}%", escape_like(contains))));
            format!("{column} LIKE ? ESCAPE '\\'")
        }
    };
    Ok(clause)
}

fn in_clause(column: &str, values: &[Value], bind_values: &mut Vec<SqlValue>) -> String {
    if values.is_empty() {
        return MATCH_NOTHING.to_string();
    }
    bind_values.extend(values.iter().map(json_to_sql));
    format!("{column} IN ({})", placeholders(values.len()))
}

/// Returns `?, ?, ?` for `count` parameters.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn range_sql(op: RangeOp) -> &'static str {
    match op {
        RangeOp::Gte => ">=",
        RangeOp::Lte => "<=",
        RangeOp::Gt => ">",
        RangeOp::Lt => "<",
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Maps a JSON value to a bindable SQLite value.
///
/// Booleans become 0/1; arrays and objects are stored as JSON text.
pub(crate) fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Maps one SQLite column value back to JSON.
pub(crate) fn sql_to_json(value: ValueRef<'_>) -> RepoResult<Value> {
    let json = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|_| RepoError::InvalidData("non UTF-8 text column".to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
    };
    Ok(json)
}

/// Reads a full row into a record keyed by column name.
pub(crate) fn row_to_record(row: &Row<'_>, columns: &[String]) -> RepoResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        record.insert(column.clone(), sql_to_json(row.get_ref(index)?)?);
    }
    Ok(record)
}
