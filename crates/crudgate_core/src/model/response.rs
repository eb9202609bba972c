//! Uniform response and error envelopes.
//!
//! # Invariants
//! - Every operation answers with the same `ResponseEnvelope` shape.
//! - Error envelopes carry a display message; an unset status means 500.

use crate::model::envelope::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status the transport should use when an error carries none.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Outcome handed back to the transport adapter.
pub type DispatchOutcome = Result<ResponseEnvelope, ErrorEnvelope>;

/// Successful operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// One record, a list of records, or a list of ids for bulk writes.
    pub data: Value,
    /// Unpaginated filtered count for list operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Affected id for single-record writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Present instead of `total` for infinite lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
}

impl ResponseEnvelope {
    pub fn data(data: Value) -> Self {
        Self {
            data,
            total: None,
            id: None,
            page_info: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_page_info(mut self, page_info: PageInfo) -> Self {
        self.page_info = Some(page_info);
        self
    }
}

/// Completion hints for lists fetched without a total count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// Failure reported to the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub fn status_or_default(&self) -> u16 {
        self.status.unwrap_or(DEFAULT_ERROR_STATUS)
    }
}
