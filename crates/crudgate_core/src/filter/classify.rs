//! Rule-based filter classification.
//!
//! Each entry of the filter bag runs through the skip guards first, then the
//! classification rules in priority order. The first rule that matches decides
//! the predicate kind; entries no rule matches are dropped.

use crate::model::predicate::{Predicate, PredicateTree, RangeOp};
use serde_json::{Map, Value};

/// Generic search term not bound to any column. Not supported; skipped.
pub const FREE_TEXT_KEY: &str = "q";

/// Pagination/sort keys that sometimes leak into the filter bag. Columns with
/// these names cannot be filtered on.
const CONTROL_FIELDS: &[&str] = &["page", "perPage", "per_page", "skip", "take", "sort"];

/// Key names that always compare by exact value.
const IDENTITY_FIELDS: &[&str] = &["id", "uuid", "cuid"];
const ID_REFERENCE_SUFFIX: &str = "_id";

/// Result of classifying one filter entry.
#[derive(Debug, Clone, PartialEq)]
enum Classification {
    Range { path: String, op: RangeOp, value: Value },
    Exact { path: String, value: Value },
    Membership { path: String, values: Vec<Value> },
    Containment { path: String, text: String },
}

struct ClassificationRule {
    name: &'static str,
    classify: fn(&str, &Value) -> Option<Classification>,
}

/// Rules in priority order. Range suffixes are inspected before exactness so
/// that `age_gte: 18` lands on `age` instead of an `age_gte` column.
const RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "range_suffix",
        classify: classify_range,
    },
    ClassificationRule {
        name: "exact",
        classify: classify_exact,
    },
    ClassificationRule {
        name: "membership",
        classify: classify_membership,
    },
    ClassificationRule {
        name: "containment",
        classify: classify_containment,
    },
];

/// Normalizes a raw filter bag into a predicate tree.
///
/// # Contract
/// - Never fails; unrecognized value shapes are skipped.
/// - Output paths are input keys with any range suffix stripped.
pub fn normalize(filter: &Map<String, Value>) -> PredicateTree {
    let mut tree = PredicateTree::new();

    for (key, value) in filter {
        if should_skip(key, value) {
            continue;
        }

        let classified = RULES.iter().find_map(|rule| {
            (rule.classify)(key, value).map(|classification| (rule.name, classification))
        });

        match classified {
            Some((rule, classification)) => {
                log::trace!("event=filter_normalize module=filter status=ok rule={rule}");
                apply(&mut tree, classification);
            }
            None => log::debug!(
                "event=filter_normalize module=filter status=skip reason=unsupported_shape"
            ),
        }
    }

    tree
}

/// Whether `key` is a pagination/sort control key rather than a column.
pub fn is_control_field(key: &str) -> bool {
    CONTROL_FIELDS.contains(&key)
}

/// Whether `key` names an identity-like column compared by exact value.
///
/// Only the last path segment is inspected, so `author.id` counts as well.
pub fn is_identity_field(key: &str) -> bool {
    let last_segment = key.rsplit('.').next().unwrap_or(key);
    IDENTITY_FIELDS.contains(&last_segment) || last_segment.ends_with(ID_REFERENCE_SUFFIX)
}

fn should_skip(key: &str, value: &Value) -> bool {
    if key.trim().is_empty() || is_control_field(key) {
        return true;
    }
    // Empty inputs in admin filter forms arrive as "" and mean "no filter".
    if matches!(value, Value::String(text) if text.is_empty()) {
        return true;
    }
    key == FREE_TEXT_KEY
}

fn classify_range(key: &str, value: &Value) -> Option<Classification> {
    let (path, op) = RangeOp::strip_suffix(key)?;
    Some(Classification::Range {
        path: path.to_string(),
        op,
        value: value.clone(),
    })
}

fn classify_exact(key: &str, value: &Value) -> Option<Classification> {
    let exact = is_identity_field(key) || matches!(value, Value::Number(_) | Value::Bool(_));
    exact.then(|| Classification::Exact {
        path: key.to_string(),
        value: value.clone(),
    })
}

fn classify_membership(key: &str, value: &Value) -> Option<Classification> {
    match value {
        Value::Array(values) => Some(Classification::Membership {
            path: key.to_string(),
            values: values.clone(),
        }),
        _ => None,
    }
}

fn classify_containment(key: &str, value: &Value) -> Option<Classification> {
    match value {
        Value::String(text) => Some(Classification::Containment {
            path: key.to_string(),
            text: text.clone(),
        }),
        _ => None,
    }
}

fn apply(tree: &mut PredicateTree, classification: Classification) {
    match classification {
        Classification::Range { path, op, value } => tree.merge_range(path, op, value),
        Classification::Exact { path, value } => tree.set(path, Predicate::Equals(value)),
        Classification::Membership { path, values } => tree.set(path, Predicate::one_of(values)),
        Classification::Containment { path, text } => tree.set(path, Predicate::contains(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_exact, is_control_field, is_identity_field, RULES};
    use serde_json::json;

    #[test]
    fn rules_run_in_fixed_priority_order() {
        let names: Vec<&str> = RULES.iter().map(|rule| rule.name).collect();
        assert_eq!(names, ["range_suffix", "exact", "membership", "containment"]);
    }

    #[test]
    fn identity_detection_uses_last_segment() {
        assert!(is_identity_field("id"));
        assert!(is_identity_field("author_id"));
        assert!(is_identity_field("author.uuid"));
        assert!(!is_identity_field("tagIds"));
        assert!(!is_identity_field("identity"));
    }

    #[test]
    fn exact_rule_ignores_plain_strings_on_regular_fields() {
        assert!(classify_exact("title", &json!("hello")).is_none());
        assert!(classify_exact("title", &json!(3)).is_some());
        assert!(classify_exact("published", &json!(false)).is_some());
    }

    #[test]
    fn only_paging_and_sort_keys_are_reserved() {
        assert!(is_control_field("perPage"));
        assert!(is_control_field("sort"));
        assert!(!is_control_field("order"));
        assert!(!is_control_field("field"));
        assert!(!is_control_field("meta"));
    }
}
