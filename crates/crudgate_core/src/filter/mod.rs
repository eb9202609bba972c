//! Filter normalization.
//!
//! # Responsibility
//! - Turn the loosely typed filter bag sent by the admin front end into a
//!   `PredicateTree`.
//!
//! # Invariants
//! - Normalization is pure and total: malformed entries are skipped.

mod classify;

pub use classify::{is_control_field, is_identity_field, normalize, FREE_TEXT_KEY};
