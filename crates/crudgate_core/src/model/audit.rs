//! Audit entry model.
//!
//! # Invariants
//! - One entry describes one mutation of one record.
//! - Entries are never mutated once handed to a sink.

use crate::model::envelope::{OperationKind, Record, RecordId};
use serde::{Deserialize, Serialize};

/// Mutation description handed to an audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor: Option<String>,
    pub operation: OperationKind,
    pub resource: String,
    pub record_id: RecordId,
    /// Snapshot of the fields this mutation changed.
    pub changed_fields: Record,
}

/// Persisted audit row as read back from the audit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    #[serde(flatten)]
    pub entry: AuditEntry,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}
