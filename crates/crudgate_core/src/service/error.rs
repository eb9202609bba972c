//! Dispatcher error taxonomy and its mapping to error envelopes.

use crate::model::envelope::RecordId;
use crate::model::response::ErrorEnvelope;
use crate::repo::audit_repo::AuditError;
use crate::repo::entity_store::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug)]
pub enum DispatchError {
    /// Resource/model name resolves to no declared entity.
    UnknownResource(String),
    /// `method` is not one of the nine operations.
    UnsupportedOperation(String),
    /// Point lookup or single-record write on a missing id.
    NotFound { resource: String, id: RecordId },
    /// Malformed params or a field the storage cannot address.
    ValidationFailure(String),
    StorageFailure(RepoError),
    /// The write succeeded but its audit entry could not be recorded.
    AuditFailure(AuditError),
}

impl DispatchError {
    /// Status carried by the error envelope; `None` lets the transport default to 500.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnknownResource(_) | Self::NotFound { .. } => Some(404),
            Self::UnsupportedOperation(_) | Self::ValidationFailure(_) => Some(400),
            Self::StorageFailure(_) | Self::AuditFailure(_) => None,
        }
    }

    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownResource(_) => "unknown_resource",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::NotFound { .. } => "not_found",
            Self::ValidationFailure(_) => "validation_failure",
            Self::StorageFailure(_) => "storage_failure",
            Self::AuditFailure(_) => "audit_failure",
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.to_string(), self.status())
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownResource(name) => write!(f, "No model found for \"{name}\""),
            Self::UnsupportedOperation(method) => write!(f, "Invalid method \"{method}\""),
            Self::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            Self::ValidationFailure(message) => write!(f, "{message}"),
            Self::StorageFailure(err) => write!(f, "{err}"),
            Self::AuditFailure(err) => write!(f, "write persisted but audit failed: {err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFailure(err) => Some(err),
            Self::AuditFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for DispatchError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound {
                resource: entity,
                id,
            },
            RepoError::InvalidQuery(message) => Self::ValidationFailure(message),
            other => Self::StorageFailure(other),
        }
    }
}

impl From<AuditError> for DispatchError {
    fn from(value: AuditError) -> Self {
        Self::AuditFailure(value)
    }
}
