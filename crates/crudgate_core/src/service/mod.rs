//! Dispatch and operation handling.
//!
//! # Responsibility
//! - Map operation envelopes onto handlers and storage calls.
//! - Keep transport layers decoupled from storage details.

pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod options;
