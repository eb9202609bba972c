//! Generic CRUD adapter core.
//!
//! Accepts uniform operation envelopes from an administrative front end,
//! translates them into storage queries and answers with uniform envelopes.

pub mod config;
pub mod db;
pub mod filter;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{AdapterConfig, ConfigError, LoggingConfig};
pub use filter::normalize;
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget};
pub use model::audit::{AuditEntry, AuditRecord};
pub use model::envelope::{OperationEnvelope, OperationKind, Record, RecordId, SortOrder};
pub use model::predicate::{Predicate, PredicateTree, RangeOp};
pub use model::response::{DispatchOutcome, ErrorEnvelope, PageInfo, ResponseEnvelope};
pub use repo::audit_repo::{AuditError, AuditResult, AuditSink, SqliteAuditSink};
pub use repo::entity::{EntityRegistry, EntitySchema, IdStrategy, RegistryError, RelationSchema};
pub use repo::entity_store::{
    EntityStore, FindQuery, RepoError, RepoResult, SqliteEntityStore, SqliteStorage, Storage,
};
pub use service::audit::{AuditOptions, AuditRecorder};
pub use service::dispatcher::{Dispatcher, Interceptors, RequestContext};
pub use service::error::{DispatchError, DispatchResult};
pub use service::options::{HandlerOptions, ListOptions, WriteOptions};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
