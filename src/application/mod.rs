//! Application layer: pruning services and the session orchestrator
//!
//! This layer drives the domain document model and depends on I/O boundary traits.

pub mod error;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
