//! Domain layer: directives and the document model
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod directive;
pub mod document;
pub mod error;
pub mod visited;

pub use directive::{parse, DirectiveSet, ScopedRule, SelectorDirective, FRAME_SELECTOR};
pub use document::{DenialReason, DocumentId, DocumentTree, FrameAccess, BLANK_LOCATION};
pub use error::{DomainError, DomainResult};
pub use visited::{Lane, VisitedSet};
