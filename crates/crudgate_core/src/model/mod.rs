//! Request, predicate, response and audit data shapes.
//!
//! # Responsibility
//! - Define the request-scoped values exchanged between transport, dispatcher,
//!   handlers and storage.
//!
//! # Invariants
//! - Envelopes and predicate trees live for one call; nothing here is cached.

pub mod audit;
pub mod envelope;
pub mod predicate;
pub mod response;
