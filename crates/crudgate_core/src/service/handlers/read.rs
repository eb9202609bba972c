//! Read handlers: getList, getOne, getMany, getManyReference.

use super::expand::expand_relations;
use super::{decode_params, records_to_value, HandlerContext};
use crate::filter::normalize;
use crate::model::envelope::{
    GetManyParams, GetManyReferenceParams, GetOneParams, ListParams, OperationKind,
};
use crate::model::predicate::{Predicate, PredicateTree};
use crate::model::response::{PageInfo, ResponseEnvelope};
use crate::repo::entity::is_valid_identifier;
use crate::repo::entity_store::FindQuery;
use crate::service::error::{DispatchError, DispatchResult};
use serde_json::Value;

/// Offset/limit pair derived from list params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageWindow {
    skip: u64,
    take: u64,
}

pub(super) fn get_list(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: ListParams = decode_params(OperationKind::GetList, params)?;
    let filter = normalize(&params.filter);
    list_records(ctx, &params, filter)
}

pub(super) fn get_many_reference(
    ctx: &HandlerContext<'_>,
    params: Value,
) -> DispatchResult<ResponseEnvelope> {
    let params: GetManyReferenceParams = decode_params(OperationKind::GetManyReference, params)?;
    if !is_valid_identifier(&params.target) {
        return Err(DispatchError::ValidationFailure(format!(
            "invalid reference target `{}`",
            params.target
        )));
    }

    // The parent constraint wins over any filter on the same column.
    let filter = normalize(&params.list.filter).with_equals(params.target.clone(), params.id.to_value());
    list_records(ctx, &params.list, filter)
}

pub(super) fn get_one(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: GetOneParams = decode_params(OperationKind::GetOne, params)?;
    let record = ctx
        .store
        .find_unique(&params.id)?
        .ok_or_else(|| DispatchError::NotFound {
            resource: ctx.entity.name.clone(),
            id: params.id.clone(),
        })?;

    let mut records = [record];
    expand_relations(ctx, &mut records)?;
    let [record] = records;
    Ok(ResponseEnvelope::data(Value::Object(record)).with_id(params.id))
}

pub(super) fn get_many(ctx: &HandlerContext<'_>, params: Value) -> DispatchResult<ResponseEnvelope> {
    let params: GetManyParams = decode_params(OperationKind::GetMany, params)?;
    if params.ids.is_empty() {
        return Ok(ResponseEnvelope::data(Value::Array(Vec::new())));
    }

    let mut filter = PredicateTree::new();
    filter.set(
        ctx.entity.primary_key.clone(),
        Predicate::one_of(params.ids.iter().map(|id| id.to_value()).collect()),
    );
    // Missing ids are simply absent from the result.
    let mut records = ctx.store.find(&FindQuery::filtered(filter))?;
    expand_relations(ctx, &mut records)?;
    Ok(ResponseEnvelope::data(records_to_value(records)))
}

fn list_records(
    ctx: &HandlerContext<'_>,
    params: &ListParams,
    filter: PredicateTree,
) -> DispatchResult<ResponseEnvelope> {
    let window = page_window(ctx, params)?;
    let infinite = params.infinite.unwrap_or(ctx.options.list.infinite);
    let query = FindQuery {
        filter,
        order_by: params
            .sort
            .as_ref()
            .map(|sort| (sort.field.clone(), sort.order)),
        skip: window.skip,
        take: Some(window.take),
    };

    let mut records = ctx.store.find(&query)?;
    expand_relations(ctx, &mut records)?;

    let response = if infinite {
        let has_next_page = u64::try_from(records.len()).map_or(false, |len| len == window.take);
        ResponseEnvelope::data(records_to_value(records)).with_page_info(PageInfo {
            has_next_page,
            has_previous_page: window.skip > 0,
        })
    } else {
        let total = ctx.store.count(&query.filter)?;
        ResponseEnvelope::data(records_to_value(records)).with_total(total)
    };
    Ok(response)
}

fn page_window(ctx: &HandlerContext<'_>, params: &ListParams) -> DispatchResult<PageWindow> {
    let options = &ctx.options.list;
    match params.pagination {
        Some(pagination) => {
            if pagination.page == 0 || pagination.per_page == 0 {
                return Err(DispatchError::ValidationFailure(
                    "pagination.page and pagination.perPage must be at least 1".to_string(),
                ));
            }
            let take = options.clamp_per_page(pagination.per_page);
            let skip = (pagination.page - 1).checked_mul(take).ok_or_else(|| {
                DispatchError::ValidationFailure("pagination is out of range".to_string())
            })?;
            Ok(PageWindow { skip, take })
        }
        None => {
            let take = params.take.unwrap_or(options.default_per_page);
            if take == 0 {
                return Err(DispatchError::ValidationFailure(
                    "take must be at least 1".to_string(),
                ));
            }
            Ok(PageWindow {
                skip: params.skip.unwrap_or(0),
                take: options.clamp_per_page(take),
            })
        }
    }
}
