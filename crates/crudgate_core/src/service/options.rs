//! Per-operation handler options.

use crate::model::envelope::Record;
use serde::Deserialize;
use std::collections::BTreeSet;

const DEFAULT_PER_PAGE: u64 = 25;

/// Options for `getList` and `getManyReference`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListOptions {
    /// Page size used when the request carries neither `pagination` nor `take`.
    pub default_per_page: u64,
    /// Upper bound applied to any requested page size.
    pub max_per_page: Option<u64>,
    /// Skip total counts unless a request asks otherwise.
    pub infinite: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: None,
            infinite: false,
        }
    }
}

impl ListOptions {
    pub fn clamp_per_page(&self, per_page: u64) -> u64 {
        self.max_per_page
            .map_or(per_page, |max| per_page.min(max))
    }
}

/// Field filtering for create/update payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteOptions {
    /// Fields removed from `data` before persisting.
    pub skip_fields: BTreeSet<String>,
    /// When set, every field outside this list is removed.
    pub allow_only_fields: Option<BTreeSet<String>>,
}

impl WriteOptions {
    /// Applies `allow_only_fields` then `skip_fields` to a payload.
    pub fn sanitize(&self, mut data: Record) -> Record {
        if let Some(allowed) = &self.allow_only_fields {
            data.retain(|field, _| allowed.contains(field));
        }
        data.retain(|field, _| !self.skip_fields.contains(field));
        data
    }
}

/// Options consumed by the operation handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    pub list: ListOptions,
    pub create: WriteOptions,
    pub update: WriteOptions,
}

#[cfg(test)]
mod tests {
    use super::{ListOptions, WriteOptions};
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn sanitize_applies_allow_list_before_skip_list() {
        let options = WriteOptions {
            skip_fields: BTreeSet::from(["secret".to_string()]),
            allow_only_fields: Some(BTreeSet::from(["title".to_string(), "secret".to_string()])),
        };
        let data = json!({"title": "a", "secret": "b", "views": 3});
        let sanitized = options.sanitize(data.as_object().unwrap().clone());
        assert_eq!(serde_json::Value::Object(sanitized), json!({"title": "a"}));
    }

    #[test]
    fn clamp_per_page_respects_max() {
        let options = ListOptions {
            max_per_page: Some(50),
            ..ListOptions::default()
        };
        assert_eq!(options.clamp_per_page(500), 50);
        assert_eq!(ListOptions::default().clamp_per_page(500), 500);
    }
}
