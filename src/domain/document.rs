//! Document model seen by the pruning engine.
//!
//! A host (a browser, or the in-memory [`Page`](crate::infrastructure::page::Page))
//! exposes its documents through [`DocumentTree`]. The engine never creates or
//! destroys documents; it only looks elements up, removes them, and asks for
//! the document behind a frame element.

use std::fmt;
use std::hash::Hash;

use generational_arena::Index;

use crate::domain::error::DomainResult;

/// Location of an empty placeholder document.
pub const BLANK_LOCATION: &str = "about:blank";

/// Opaque handle to one document of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Index);

impl DocumentId {
    pub fn new(index: Index) -> Self {
        Self(index)
    }

    pub fn index(&self) -> Index {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "doc#{}.{}", slot, generation)
    }
}

/// Why a frame's document could not be entered directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Origin policy forbids access from the embedding document.
    CrossOrigin,
    /// The frame has no document attached (yet).
    NotLoaded,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::CrossOrigin => write!(f, "cross-origin"),
            DenialReason::NotLoaded => write!(f, "not loaded"),
        }
    }
}

/// Result of asking for the document behind a frame element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAccess {
    Accessible(DocumentId),
    Denied(DenialReason),
}

/// Capability surface of a document host.
pub trait DocumentTree {
    /// Element handle, stable for the lifetime of the element.
    type Element: Copy + Eq + Hash + fmt::Debug;

    /// The top-level (main) document.
    fn top(&self) -> DocumentId;

    /// Every document the host knows about, accessible or not.
    fn documents(&self) -> Vec<DocumentId>;

    /// Location of the document, `None` for a stale handle.
    fn location(&self, doc: DocumentId) -> Option<&str>;

    /// Whether the document has a renderable root (`body`) to observe.
    fn has_body(&self, doc: DocumentId) -> bool;

    /// All attached elements of `doc` matching `selector`, in document order.
    fn query(&self, doc: DocumentId, selector: &str) -> DomainResult<Vec<Self::Element>>;

    /// Detach `element` from its parent, also when an ancestor was removed
    /// before it. Returns `false` if it does not exist or has no parent.
    fn remove(&mut self, doc: DocumentId, element: Self::Element) -> bool;

    /// The document behind a frame element of `doc`.
    fn frame_document(&self, doc: DocumentId, frame: Self::Element) -> FrameAccess;

    /// The document an attached frame element of `doc` shows, whatever its
    /// origin. Remote executors run there.
    fn frame_target(&self, doc: DocumentId, frame: Self::Element) -> Option<DocumentId> {
        match self.frame_document(doc, frame) {
            FrameAccess::Accessible(child) => Some(child),
            FrameAccess::Denied(_) => None,
        }
    }

    /// Drain the documents whose child lists changed since the last call.
    fn take_mutations(&mut self) -> Vec<DocumentId>;

    /// Whether the document is an empty placeholder.
    fn is_blank(&self, doc: DocumentId) -> bool {
        matches!(self.location(doc), Some(loc) if loc.is_empty() || loc == BLANK_LOCATION)
    }
}
