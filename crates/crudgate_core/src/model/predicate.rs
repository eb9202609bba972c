//! Predicate tree produced by filter normalization.
//!
//! # Responsibility
//! - Describe one condition per field path as a tagged variant.
//! - Merge range operators targeting the same path.
//!
//! # Invariants
//! - Exactly one predicate kind exists per field path.
//! - Range merges never drop an operator already merged on the same path.
//! - Field paths use `.` to address a column of a related entity.

use serde::Serialize;
use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};

/// Range comparison operator carried by suffixed filter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeOp {
    Gte,
    Lte,
    Gt,
    Lt,
}

impl RangeOp {
    /// Suffix-matching order. Two-letter operators come first so `_gte` is
    /// never mistaken for `_gt` followed by a stray `e`.
    pub const ALL: [RangeOp; 4] = [RangeOp::Gte, RangeOp::Lte, RangeOp::Gt, RangeOp::Lt];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Lt => "lt",
        }
    }

    /// Filter key suffix, e.g. `_gte`.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Gte => "_gte",
            Self::Lte => "_lte",
            Self::Gt => "_gt",
            Self::Lt => "_lt",
        }
    }

    /// Splits `age_gte` into (`age`, `Gte`). Returns `None` for unsuffixed keys
    /// and for keys that are nothing but a suffix.
    pub fn strip_suffix(key: &str) -> Option<(&str, RangeOp)> {
        Self::ALL.iter().find_map(|op| {
            key.strip_suffix(op.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| (base, *op))
        })
    }
}

/// One normalized condition on a field path.
///
/// Serializes to the wire shape used in diagnostics: a bare literal for
/// equality, `{gte: .., lt: ..}` for ranges, `{in: [..]}` and `{contains: ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Predicate {
    Equals(Value),
    Range(BTreeMap<RangeOp, Value>),
    In {
        #[serde(rename = "in")]
        values: Vec<Value>,
    },
    Contains {
        contains: String,
    },
}

impl Predicate {
    pub fn range(op: RangeOp, value: Value) -> Self {
        Self::Range(BTreeMap::from([(op, value)]))
    }

    pub fn one_of(values: Vec<Value>) -> Self {
        Self::In { values }
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains {
            contains: text.into(),
        }
    }
}

/// Field-path to predicate mapping, combined as a conjunction by storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredicateTree {
    fields: BTreeMap<String, Predicate>,
}

impl PredicateTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `predicate` at `path`, replacing whatever was there.
    pub fn set(&mut self, path: impl Into<String>, predicate: Predicate) {
        self.fields.insert(path.into(), predicate);
    }

    /// Merges one range operator into `path`.
    ///
    /// Operators already present on the path are kept; a non-range predicate
    /// on the same path is replaced because one path holds one predicate kind.
    pub fn merge_range(&mut self, path: impl Into<String>, op: RangeOp, value: Value) {
        match self.fields.entry(path.into()) {
            btree_map::Entry::Occupied(mut entry) => match entry.get_mut() {
                Predicate::Range(bounds) => {
                    bounds.insert(op, value);
                }
                other => *other = Predicate::range(op, value),
            },
            btree_map::Entry::Vacant(entry) => {
                entry.insert(Predicate::range(op, value));
            }
        }
    }

    /// Returns a copy with an equality predicate forced on `path`.
    pub fn with_equals(mut self, path: impl Into<String>, value: Value) -> Self {
        self.set(path, Predicate::Equals(value));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Predicate> {
        self.fields.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.fields
            .iter()
            .map(|(path, predicate)| (path.as_str(), predicate))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Predicate)> for PredicateTree {
    fn from_iter<T: IntoIterator<Item = (String, Predicate)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
