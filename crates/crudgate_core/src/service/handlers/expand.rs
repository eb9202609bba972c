//! Reference expansion for read results.

use super::HandlerContext;
use crate::model::envelope::{Record, RecordId};
use crate::model::predicate::{Predicate, PredicateTree};
use crate::repo::entity_store::FindQuery;
use crate::service::error::{DispatchError, DispatchResult};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Attaches every relation listed in the entity's `expand` to `records`.
///
/// Each relation costs one `find` on the related entity regardless of how
/// many rows reference it. Rows whose key matches nothing get `null`.
pub(super) fn expand_relations(
    ctx: &HandlerContext<'_>,
    records: &mut [Record],
) -> DispatchResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    for name in &ctx.entity.expand {
        let relation = ctx.entity.relations.get(name).ok_or_else(|| {
            DispatchError::ValidationFailure(format!("unknown relation `{name}`"))
        })?;
        let related = ctx.registry.entity(&relation.entity).ok_or_else(|| {
            DispatchError::UnknownResource(relation.entity.clone())
        })?;

        let keys: BTreeSet<RecordId> = records
            .iter()
            .filter_map(|record| record.get(&relation.foreign_key))
            .filter_map(RecordId::from_value)
            .collect();
        if keys.is_empty() {
            for record in records.iter_mut() {
                record.insert(name.clone(), Value::Null);
            }
            continue;
        }

        let mut filter = PredicateTree::new();
        filter.set(
            related.primary_key.clone(),
            Predicate::one_of(keys.iter().map(RecordId::to_value).collect()),
        );
        let store = ctx.storage.entity(related, ctx.registry);
        let by_key: BTreeMap<RecordId, Record> = store
            .find(&FindQuery::filtered(filter))?
            .into_iter()
            .filter_map(|row| {
                row.get(&related.primary_key)
                    .and_then(RecordId::from_value)
                    .map(|key| (key, row))
            })
            .collect();

        for record in records.iter_mut() {
            let expanded = record
                .get(&relation.foreign_key)
                .and_then(RecordId::from_value)
                .and_then(|key| by_key.get(&key))
                .cloned()
                .map_or(Value::Null, Value::Object);
            record.insert(name.clone(), expanded);
        }
    }
    Ok(())
}
