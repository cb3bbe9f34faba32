//! Remote execution contract for frames the orchestrator cannot enter.
//!
//! The orchestrator never builds executable text. It sends a
//! [`RemoteInvocation`] (the parsed directives plus a target) to a
//! [`RemoteExecutor`], which runs [`run_in_context`] inside each frame of the
//! page. `run_in_context` depends on nothing but its parameters.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::application::services::pruner;
use crate::application::services::traversal::{self, TraversalReport};
use crate::application::ApplicationResult;
use crate::domain::{DirectiveSet, DocumentId, DocumentTree, VisitedSet, FRAME_SELECTOR};

/// Which frames of the target page the unit runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationTarget {
    pub all_frames: bool,
}

/// Request to run the pruning unit inside a target page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInvocation {
    pub target: InvocationTarget,
    pub directives: DirectiveSet,
}

impl RemoteInvocation {
    /// Run in the top document and every frame of the page.
    pub fn all_frames(directives: DirectiveSet) -> Self {
        Self {
            target: InvocationTarget { all_frames: true },
            directives,
        }
    }

    /// Run in the top document only.
    pub fn top_only(directives: DirectiveSet) -> Self {
        Self {
            target: InvocationTarget { all_frames: false },
            directives,
        }
    }
}

/// How a pass was reached, which bounds how long its contexts are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reach {
    /// Reached from the main document.
    Main,
    /// Reached only from inside an already-entered frame.
    Nested,
}

/// Result of running the unit in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPass {
    pub document: DocumentId,
    pub reach: Reach,
    pub report: TraversalReport,
}

/// Everything one remote invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutcome {
    pub passes: Vec<ContextPass>,
}

impl RemoteOutcome {
    pub fn removed(&self) -> usize {
        self.passes.iter().map(|p| p.report.removed).sum()
    }
}

/// External mechanism able to run the pruning unit inside isolated contexts.
pub trait RemoteExecutor<T: DocumentTree> {
    fn execute(
        &mut self,
        tree: &mut T,
        request: &RemoteInvocation,
    ) -> ApplicationResult<RemoteOutcome>;
}

/// The unit executed inside one document.
///
/// In the top document this is the full frame traversal. Inside a frame, the
/// frame cannot know which rule selected it, so every frame-scoped element
/// selector applies alongside the normal selectors, then accessible nested
/// frames receive the same treatment.
pub fn run_in_context<T: DocumentTree>(
    tree: &mut T,
    doc: DocumentId,
    directives: &DirectiveSet,
) -> ContextPass {
    if doc == tree.top() {
        return ContextPass {
            document: doc,
            reach: Reach::Main,
            report: traversal::traverse_report(tree, doc, directives),
        };
    }

    let selectors = directives.element_selectors();

    let mut visited = VisitedSet::new();
    let mut report = TraversalReport {
        removed: pruner::apply_all(tree, doc, &selectors),
        ..Default::default()
    };
    report.reach(doc, &selectors, true);
    report += traversal::descend(tree, doc, &selectors, &mut visited);

    debug!(%doc, removed = report.removed, "frame-local pass complete");
    ContextPass {
        document: doc,
        reach: Reach::Nested,
        report,
    }
}

/// Runs the unit directly in the documents of an in-memory host, entering
/// frames the top document cannot open.
///
/// Only documents shown by an attached frame (reached from the top
/// document) are frames of the page; detached or unembedded documents are
/// left alone.
#[derive(Debug, Default)]
pub struct InProcessExecutor {
    dispatched: usize,
}

impl InProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations executed so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }
}

impl<T: DocumentTree> RemoteExecutor<T> for InProcessExecutor {
    #[instrument(level = "debug", skip_all, fields(all_frames = request.target.all_frames))]
    fn execute(
        &mut self,
        tree: &mut T,
        request: &RemoteInvocation,
    ) -> ApplicationResult<RemoteOutcome> {
        self.dispatched += 1;
        let mut outcome = RemoteOutcome::default();
        let mut seen = HashSet::new();
        let mut pending = VecDeque::from([tree.top()]);

        while let Some(doc) = pending.pop_front() {
            if !seen.insert(doc) {
                continue;
            }
            if tree.location(doc).is_none() {
                warn!(%doc, "skipping stale document");
                continue;
            }
            outcome
                .passes
                .push(run_in_context(tree, doc, &request.directives));
            if !request.target.all_frames {
                break;
            }
            // Frames still attached after this document's own pass.
            let frames = tree.query(doc, FRAME_SELECTOR).unwrap_or_default();
            pending.extend(
                frames
                    .into_iter()
                    .filter_map(|frame| tree.frame_target(doc, frame)),
            );
        }
        debug!(contexts = outcome.passes.len(), "remote invocation complete");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_invocation_when_serialized_then_carries_only_data() {
        let request = RemoteInvocation::all_frames(DirectiveSet::parse(&[".ad", "iframe#c .x"]));

        let json = serde_json::to_string(&request).unwrap();
        let back: RemoteInvocation = serde_json::from_str(&json).unwrap();

        assert!(json.contains("\"allFrames\":true"));
        assert_eq!(back, request);
    }
}
