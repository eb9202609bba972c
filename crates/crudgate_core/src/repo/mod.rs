//! Persistence layer: entity storage capability and audit sink.
//!
//! # Responsibility
//! - Define the storage and audit contracts consumed by handlers.
//! - Isolate SQLite query details from dispatch and handler orchestration.
//!
//! # Invariants
//! - Storage APIs return semantic errors (`NotFound`, `InvalidQuery`) in
//!   addition to DB transport errors.

pub mod audit_repo;
pub mod entity;
pub mod entity_store;
mod sql;
