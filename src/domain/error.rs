//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::DocumentId;

/// Domain errors are raised by document hosts and never abort a pruning batch.
/// Callers log them and count the affected lookup as zero removals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
