//! Write handlers: create, update, updateMany, delete, deleteMany.
//!
//! Every handler persists first and audits second. Bulk handlers audit each
//! id right after its own write so a failure never leaves an earlier write
//! unaudited.

use super::{decode_params, ids_to_value, HandlerContext};
use crate::model::envelope::{
    CreateParams, DeleteManyParams, DeleteParams, OperationKind, Record, RecordId,
    UpdateManyParams, UpdateParams,
};
use crate::model::response::ResponseEnvelope;
use crate::repo::audit_repo::now_epoch_ms;
use crate::repo::entity_store::RepoError;
use crate::service::audit::changed_fields;
use crate::service::error::DispatchResult;
use serde_json::Value;

pub(super) fn create(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: CreateParams = decode_params(OperationKind::Create, params)?;
    let data = ctx.options.create.sanitize(params.data);

    let record = ctx.store.create(&data)?;
    let id = ctx.record_id(&record)?;
    ctx.audit.record(&id, record.clone())?;

    Ok(ResponseEnvelope::data(Value::Object(record)).with_id(id))
}

pub(super) fn update(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: UpdateParams = decode_params(OperationKind::Update, params)?;
    let data = update_payload(ctx, params.data);

    let record = ctx.store.update(&params.id, &data)?;
    ctx.audit
        .record(&params.id, changed_fields(params.previous_data.as_ref(), &data))?;

    Ok(ResponseEnvelope::data(Value::Object(record)).with_id(params.id))
}

pub(super) fn update_many(
    ctx: &HandlerContext<'_>,
    params: Value,
) -> DispatchResult<ResponseEnvelope> {
    let params: UpdateManyParams = decode_params(OperationKind::UpdateMany, params)?;
    let data = update_payload(ctx, params.data);

    let mut updated = Vec::with_capacity(params.ids.len());
    for id in params.ids {
        if skip_missing(ctx.store.update(&id, &data))?.is_none() {
            continue;
        }
        ctx.audit.record(&id, data.clone())?;
        updated.push(id);
    }

    Ok(ResponseEnvelope::data(ids_to_value(&updated)))
}

pub(super) fn delete(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: DeleteParams = decode_params(OperationKind::Delete, params)?;

    let (record, changed) = remove(ctx, &params.id)?;
    ctx.audit.record(&params.id, changed)?;

    Ok(ResponseEnvelope::data(Value::Object(record)).with_id(params.id))
}

pub(super) fn delete_many(
    ctx: &HandlerContext<'_>,
    params: Value,
) -> DispatchResult<ResponseEnvelope> {
    let params: DeleteManyParams = decode_params(OperationKind::DeleteMany, params)?;

    let mut deleted = Vec::with_capacity(params.ids.len());
    for id in params.ids {
        let Some((_, changed)) = skip_missing(remove(ctx, &id))? else {
            continue;
        };
        ctx.audit.record(&id, changed)?;
        deleted.push(id);
    }

    Ok(ResponseEnvelope::data(ids_to_value(&deleted)))
}

/// Hard or soft delete depending on the entity.
///
/// Returns the row as it looked after the operation and the audit snapshot:
/// the removed row for hard deletes, `{marker: timestamp}` for soft deletes.
fn remove(ctx: &HandlerContext<'_>, id: &RecordId) -> Result<(Record, Record), RepoError> {
    match ctx.entity.soft_delete_field.as_deref() {
        Some(marker) => {
            let mut patch = Record::new();
            patch.insert(marker.to_string(), Value::from(now_epoch_ms()));
            let record = ctx.store.update(id, &patch)?;
            Ok((record, patch))
        }
        None => {
            let record = ctx.store.delete(id)?;
            Ok((record.clone(), record))
        }
    }
}

/// Payload for update operations: options applied, primary key removed.
fn update_payload(ctx: &HandlerContext<'_>, data: Record) -> Record {
    let mut data = ctx.options.update.sanitize(data);
    data.remove(&ctx.entity.primary_key);
    data
}

/// Turns a storage `NotFound` into `None` for bulk operations.
fn skip_missing<T>(result: Result<T, RepoError>) -> DispatchResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RepoError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
