//! Infrastructure layer: I/O implementations, the page host and DI container
//!
//! This layer implements I/O boundary traits and wires up services.

pub mod bundle;
pub mod di;
pub mod error;
pub mod page;
pub mod store;
pub mod traits;

pub use error::{InfraError, InfraResult};
