//! Operation envelope and per-operation parameter shapes.
//!
//! # Responsibility
//! - Define the uniform request shape delivered by the transport adapter.
//! - Provide typed parameter structs decoded once the method is known.
//!
//! # Invariants
//! - `method` stays a raw string until the dispatcher resolves it, so an
//!   unknown method is reported as unsupported rather than as a decode error.
//! - Parameter names follow the admin front end (`perPage`, `previousData`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// One stored row, keyed by column name.
pub type Record = Map<String, Value>;

/// The nine operations the adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    GetList,
    GetOne,
    GetMany,
    GetManyReference,
    Create,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::GetList,
        OperationKind::GetOne,
        OperationKind::GetMany,
        OperationKind::GetManyReference,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::UpdateMany,
        OperationKind::Delete,
        OperationKind::DeleteMany,
    ];

    /// Wire name used in the envelope `method` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetList => "getList",
            Self::GetOne => "getOne",
            Self::GetMany => "getMany",
            Self::GetManyReference => "getManyReference",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Whether the operation writes to storage and is therefore auditable.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::UpdateMany | Self::Delete | Self::DeleteMany
        )
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform request delivered by the transport adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    pub method: String,
    pub resource: String,
    /// Overrides which storage entity backs `resource`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl OperationEnvelope {
    pub fn new(kind: OperationKind, resource: impl Into<String>, params: Value) -> Self {
        Self {
            method: kind.as_str().to_string(),
            resource: resource.into(),
            model: None,
            params,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Storage entity name to resolve: `model` when present, else `resource`.
    pub fn entity_name(&self) -> &str {
        self.model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(self.resource.as_str())
    }
}

/// Primary key value. Admin front ends send either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Reads an id out of a stored column value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Int),
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Text(value) => Value::String(value.clone()),
        }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Parameters shared by `getList` and `getManyReference`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    /// Raw offset; used only when `pagination` is absent.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Raw page size; used only when `pagination` is absent.
    #[serde(default)]
    pub take: Option<u64>,
    #[serde(default)]
    pub sort: Option<Sort>,
    /// Raw filter bag; `null` and absent both mean "no filter".
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub filter: Map<String, Value>,
    /// Skip the total count and report `pageInfo` instead.
    #[serde(default)]
    pub infinite: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetOneParams {
    pub id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetManyParams {
    pub ids: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetManyReferenceParams {
    /// Column on this entity that references the parent.
    pub target: String,
    /// Parent id.
    #[serde(alias = "targetId")]
    pub id: RecordId,
    #[serde(flatten)]
    pub list: ListParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateParams {
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub id: RecordId,
    pub data: Record,
    #[serde(default)]
    pub previous_data: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateManyParams {
    pub ids: Vec<RecordId>,
    pub data: Record,
}

/// `previousData` may be sent but is ignored; the audit snapshot comes from storage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteParams {
    pub id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteManyParams {
    pub ids: Vec<RecordId>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
