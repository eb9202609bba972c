//! Audit sink contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist audit entries produced by successful mutations.
//!
//! # Invariants
//! - Audit rows are insert-only; nothing in the core updates or deletes them.
//! - One call to `record` writes exactly one row.

use crate::db::DbError;
use crate::model::audit::{AuditEntry, AuditRecord};
use crate::model::envelope::{OperationKind, Record, RecordId};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug)]
pub enum AuditError {
    Db(DbError),
    /// The sink refused the entry for a reason of its own.
    Rejected(String),
    InvalidData(String),
}

impl Display for AuditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Rejected(message) => write!(f, "audit entry rejected: {message}"),
            Self::InvalidData(message) => write!(f, "invalid audit row: {message}"),
        }
    }
}

impl Error for AuditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Rejected(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Destination for audit entries.
pub trait AuditSink {
    fn record(&self, entry: &AuditEntry) -> AuditResult<()>;
}

/// Appends audit entries to the core-owned `audit_log` table.
pub struct SqliteAuditSink<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditSink<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists audit rows for one resource, oldest first.
    pub fn list_for_resource(&self, resource: &str) -> AuditResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor, operation, resource, record_id, changed_fields, created_at
             FROM audit_log
             WHERE resource = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([resource])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_audit_row(row)?);
        }
        Ok(records)
    }
}

impl AuditSink for SqliteAuditSink<'_> {
    fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        let changed_fields = serde_json::to_string(&entry.changed_fields)
            .map_err(|err| AuditError::InvalidData(err.to_string()))?;
        let record_id = serde_json::to_string(&entry.record_id)
            .map_err(|err| AuditError::InvalidData(err.to_string()))?;

        self.conn.execute(
            "INSERT INTO audit_log (
                id,
                actor,
                operation,
                resource,
                record_id,
                changed_fields,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                Uuid::new_v4().to_string(),
                entry.actor.as_deref(),
                entry.operation.as_str(),
                entry.resource.as_str(),
                record_id,
                changed_fields,
                now_epoch_ms(),
            ],
        )?;
        Ok(())
    }
}

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

fn parse_audit_row(row: &Row<'_>) -> AuditResult<AuditRecord> {
    let operation_text: String = row.get("operation")?;
    let operation = OperationKind::parse(&operation_text).ok_or_else(|| {
        AuditError::InvalidData(format!("unknown operation `{operation_text}`"))
    })?;

    // record_id is stored as JSON so integer and text keys stay distinct.
    let record_id_text: String = row.get("record_id")?;
    let record_id: RecordId = serde_json::from_str(&record_id_text)
        .map_err(|err| AuditError::InvalidData(format!("record_id: {err}")))?;

    let changed_text: String = row.get("changed_fields")?;
    let changed_fields: Record = serde_json::from_str(&changed_text)
        .map_err(|err| AuditError::InvalidData(format!("changed_fields: {err}")))?;

    Ok(AuditRecord {
        id: row.get("id")?,
        entry: AuditEntry {
            actor: row.get("actor")?,
            operation,
            resource: row.get("resource")?,
            record_id,
            changed_fields,
        },
        created_at: row.get("created_at")?,
    })
}
