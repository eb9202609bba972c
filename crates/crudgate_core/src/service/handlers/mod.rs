//! Operation handlers, one per CRUD verb.
//!
//! # Responsibility
//! - Decode the typed params of one operation.
//! - Drive the storage capability and, for writes, the audit recorder.
//!
//! # Invariants
//! - Handlers never see an unresolved resource; the dispatcher resolves it.
//! - Mutating handlers return only after persist and audit both resolved.

mod expand;
mod read;
mod write;

use crate::model::envelope::{OperationKind, Record, RecordId};
use crate::model::response::ResponseEnvelope;
use crate::repo::entity::{EntityRegistry, EntitySchema};
use crate::repo::entity_store::{EntityStore, RepoError, Storage};
use crate::service::audit::AuditRecorder;
use crate::service::error::{DispatchError, DispatchResult};
use crate::service::options::HandlerOptions;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Everything a handler may touch while serving one operation.
pub struct HandlerContext<'a> {
    pub store: Box<dyn EntityStore + 'a>,
    pub entity: &'a EntitySchema,
    pub registry: &'a EntityRegistry,
    pub storage: &'a dyn Storage,
    pub options: &'a HandlerOptions,
    pub audit: AuditRecorder<'a>,
}

pub type Handler = fn(&HandlerContext<'_>, Value) -> DispatchResult<ResponseEnvelope>;

/// Handler table; one entry per operation.
pub fn handler_for(kind: OperationKind) -> Handler {
    match kind {
        OperationKind::GetList => read::get_list,
        OperationKind::GetOne => read::get_one,
        OperationKind::GetMany => read::get_many,
        OperationKind::GetManyReference => read::get_many_reference,
        OperationKind::Create => write::create,
        OperationKind::Update => write::update,
        OperationKind::UpdateMany => write::update_many,
        OperationKind::Delete => write::delete,
        OperationKind::DeleteMany => write::delete_many,
    }
}

fn decode_params<T: DeserializeOwned>(kind: OperationKind, params: Value) -> DispatchResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|err| DispatchError::ValidationFailure(format!("invalid {kind} params: {err}")))
}

impl HandlerContext<'_> {
    /// Reads the primary key out of a stored record.
    fn record_id(&self, record: &Record) -> DispatchResult<RecordId> {
        record
            .get(&self.entity.primary_key)
            .and_then(RecordId::from_value)
            .ok_or_else(|| {
                DispatchError::StorageFailure(RepoError::InvalidData(format!(
                    "{} row has no usable `{}`",
                    self.entity.name, self.entity.primary_key
                )))
            })
    }
}

fn records_to_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

fn ids_to_value(ids: &[RecordId]) -> Value {
    Value::Array(ids.iter().map(RecordId::to_value).collect())
}
