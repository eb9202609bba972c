//! Audit recording for mutating operations.
//!
//! # Responsibility
//! - Decide whether an operation is audited under the active options.
//! - Build one `AuditEntry` per affected record and hand it to the sink.
//!
//! # Invariants
//! - Recording happens only after storage confirmed the write.
//! - A sink failure is returned to the caller, never swallowed.

use crate::model::audit::AuditEntry;
use crate::model::envelope::{OperationKind, Record, RecordId};
use crate::repo::audit_repo::{AuditResult, AuditSink};
use log::{error, info};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Deployment-level audit switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditOptions {
    pub enabled: bool,
    /// Audited subset of the mutating operations; all of them when unset.
    pub operations: Option<BTreeSet<OperationKind>>,
    /// Actor recorded when the request context names none.
    pub default_actor: Option<String>,
}

impl AuditOptions {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Whether `kind` produces audit entries.
    pub fn audits(&self, kind: OperationKind) -> bool {
        self.enabled
            && kind.is_mutation()
            && self
                .operations
                .as_ref()
                .map_or(true, |operations| operations.contains(&kind))
    }
}

/// Request-scoped recorder bound to one operation on one resource.
pub struct AuditRecorder<'a> {
    sink: Option<&'a dyn AuditSink>,
    operation: OperationKind,
    resource: &'a str,
    actor: Option<&'a str>,
}

impl<'a> AuditRecorder<'a> {
    /// Builds a recorder; it stays inert when no sink is given or the options
    /// exclude `operation`.
    pub fn new(
        sink: Option<&'a dyn AuditSink>,
        options: &'a AuditOptions,
        operation: OperationKind,
        resource: &'a str,
        actor: Option<&'a str>,
    ) -> Self {
        Self {
            sink: sink.filter(|_| options.audits(operation)),
            operation,
            resource,
            actor: actor.or(options.default_actor.as_deref()),
        }
    }

    /// Recorder that never writes, for read operations.
    pub fn disabled(operation: OperationKind, resource: &'a str) -> Self {
        Self {
            sink: None,
            operation,
            resource,
            actor: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Records one entry for `record_id`.
    pub fn record(&self, record_id: &RecordId, changed_fields: Record) -> AuditResult<()> {
        let Some(sink) = self.sink else {
            return Ok(());
        };

        let entry = AuditEntry {
            actor: self.actor.map(str::to_string),
            operation: self.operation,
            resource: self.resource.to_string(),
            record_id: record_id.clone(),
            changed_fields,
        };
        match sink.record(&entry) {
            Ok(()) => {
                info!(
                    "event=audit_record module=service status=ok operation={} resource={} record_id={}",
                    self.operation, self.resource, record_id
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=audit_record module=service status=error operation={} resource={} record_id={} error={}",
                    self.operation, self.resource, record_id, err
                );
                Err(err)
            }
        }
    }
}

/// Fields of `data` whose value differs from `previous`.
///
/// Without a previous snapshot every field of `data` counts as changed.
pub fn changed_fields(previous: Option<&Record>, data: &Record) -> Record {
    match previous {
        Some(previous) => data
            .iter()
            .filter(|(field, value)| previous.get(field.as_str()) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect(),
        None => data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{changed_fields, AuditOptions};
    use crate::model::envelope::OperationKind;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn audits_only_selected_mutations() {
        let options = AuditOptions {
            enabled: true,
            operations: Some(BTreeSet::from([OperationKind::Delete])),
            default_actor: None,
        };
        assert!(options.audits(OperationKind::Delete));
        assert!(!options.audits(OperationKind::Create));
        assert!(!AuditOptions::enabled().audits(OperationKind::GetList));
        assert!(AuditOptions::enabled().audits(OperationKind::UpdateMany));
        assert!(!AuditOptions::default().audits(OperationKind::Create));
    }

    #[test]
    fn changed_fields_keeps_only_differences() {
        let previous = json!({"id": 1, "title": "old", "views": 3});
        let data = json!({"title": "new", "views": 3});
        let delta = changed_fields(previous.as_object(), data.as_object().unwrap());
        assert_eq!(serde_json::Value::Object(delta), json!({"title": "new"}));

        let full = changed_fields(None, data.as_object().unwrap());
        assert_eq!(full.len(), 2);
    }
}
