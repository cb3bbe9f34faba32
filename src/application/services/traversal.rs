//! Recursive pruning across the frame tree
//!
//! A top-level pass prunes the root with the normal selectors first, then
//! enters frames matching each frame-scoped rule (nested frames inherit the
//! rule), then recurses through every frame for the normal selectors. Frames
//! the host refuses to open are recorded and skipped; reaching them is left to
//! the remote executor.

use std::ops::AddAssign;

use tracing::{debug, info, instrument, warn};

use crate::application::services::pruner;
use crate::domain::{
    DenialReason, DirectiveSet, DocumentId, DocumentTree, FrameAccess, Lane, ScopedRule,
    VisitedSet, FRAME_SELECTOR,
};

/// An accessible document reached by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachedContext {
    pub document: DocumentId,
    /// Element selectors applicable in this document.
    pub selectors: Vec<String>,
    /// Whether re-runs should also descend into nested frames.
    pub cascade: bool,
}

/// A frame whose document could not be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeniedFrame {
    /// Document embedding the frame.
    pub parent: DocumentId,
    pub reason: DenialReason,
}

/// Outcome of one pass: removal count plus what was reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalReport {
    pub removed: usize,
    pub contexts: Vec<ReachedContext>,
    pub denied: Vec<DeniedFrame>,
}

impl TraversalReport {
    /// Record `doc` as reached with `selectors`, merging with an earlier visit.
    ///
    /// Blank selectors are ignored; a document with no applicable selector is
    /// not recorded.
    pub fn reach<S: AsRef<str>>(&mut self, doc: DocumentId, selectors: &[S], cascade: bool) {
        let selectors: Vec<&str> = selectors
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        if selectors.is_empty() {
            return;
        }

        match self.contexts.iter_mut().find(|c| c.document == doc) {
            Some(existing) => {
                for selector in selectors {
                    if !existing.selectors.iter().any(|s| s == selector) {
                        existing.selectors.push(selector.to_string());
                    }
                }
                existing.cascade |= cascade;
            }
            None => self.contexts.push(ReachedContext {
                document: doc,
                selectors: selectors.into_iter().map(str::to_string).collect(),
                cascade,
            }),
        }
    }

    pub fn context(&self, doc: DocumentId) -> Option<&ReachedContext> {
        self.contexts.iter().find(|c| c.document == doc)
    }

    fn deny(&mut self, parent: DocumentId, reason: DenialReason) {
        self.denied.push(DeniedFrame { parent, reason });
    }
}

impl AddAssign for TraversalReport {
    fn add_assign(&mut self, other: TraversalReport) {
        self.removed += other.removed;
        for ctx in other.contexts {
            self.reach(ctx.document, &ctx.selectors, ctx.cascade);
        }
        self.denied.extend(other.denied);
    }
}

/// Prune `root` and every reachable frame, returning the total removed.
pub fn traverse<T: DocumentTree>(
    tree: &mut T,
    root: DocumentId,
    directives: &DirectiveSet,
) -> usize {
    traverse_report(tree, root, directives).removed
}

/// Prune `root` and every reachable frame with a fresh [`VisitedSet`].
#[instrument(level = "debug", skip(tree, directives), fields(directives = directives.len()))]
pub fn traverse_report<T: DocumentTree>(
    tree: &mut T,
    root: DocumentId,
    directives: &DirectiveSet,
) -> TraversalReport {
    let normal = directives.normal();
    let scoped = directives.frame_scoped();
    let mut visited = VisitedSet::new();
    let mut report = TraversalReport::default();

    // Root content goes before any descent.
    report.removed += pruner::apply_all(tree, root, &normal);
    report.reach(root, &normal, true);

    for rule in &scoped {
        for frame in frames(tree, root, rule.frame_selector) {
            report += enter_scoped(tree, root, frame, rule, &mut visited);
        }
    }

    if normal.iter().any(|s| !s.trim().is_empty()) {
        report += descend(tree, root, &normal, &mut visited);
    }

    info!(
        %root,
        removed = report.removed,
        contexts = report.contexts.len(),
        denied = report.denied.len(),
        "traversal complete"
    );
    report
}

/// Apply `selectors` to `doc` and to every accessible frame below it.
pub fn cascade<T, S>(tree: &mut T, doc: DocumentId, selectors: &[S]) -> TraversalReport
where
    T: DocumentTree,
    S: AsRef<str>,
{
    let mut visited = VisitedSet::new();
    let mut report = TraversalReport {
        removed: pruner::apply_all(tree, doc, selectors),
        ..Default::default()
    };
    report.reach(doc, selectors, true);
    report += descend(tree, doc, selectors, &mut visited);
    report
}

/// Enter every frame of `parent` in the generic lane, applying `selectors`
/// there and recursing.
pub fn descend<T, S>(
    tree: &mut T,
    parent: DocumentId,
    selectors: &[S],
    visited: &mut VisitedSet<T::Element>,
) -> TraversalReport
where
    T: DocumentTree,
    S: AsRef<str>,
{
    let mut report = TraversalReport::default();
    for frame in frames(tree, parent, FRAME_SELECTOR) {
        if !visited.mark(Lane::Generic, parent, frame) {
            continue;
        }
        match tree.frame_document(parent, frame) {
            FrameAccess::Accessible(child) => {
                report.removed += pruner::apply_all(tree, child, selectors);
                report.reach(child, selectors, true);
                report += descend(tree, child, selectors, visited);
            }
            FrameAccess::Denied(reason) => {
                debug!(%parent, ?frame, %reason, "frame not accessible, left to remote execution");
                report.deny(parent, reason);
            }
        }
    }
    report
}

/// Enter one frame under a frame-scoped rule; nested frames inherit the rule.
fn enter_scoped<T: DocumentTree>(
    tree: &mut T,
    parent: DocumentId,
    frame: T::Element,
    rule: &ScopedRule<'_>,
    visited: &mut VisitedSet<T::Element>,
) -> TraversalReport {
    let mut report = TraversalReport::default();
    if !visited.mark(Lane::Scoped(rule.lane), parent, frame) {
        return report;
    }

    match tree.frame_document(parent, frame) {
        FrameAccess::Accessible(child) => {
            report.removed += pruner::apply(tree, child, rule.element_selector);
            report.reach(child, &[rule.element_selector], false);
            for nested in frames(tree, child, FRAME_SELECTOR) {
                report += enter_scoped(tree, child, nested, rule, visited);
            }
        }
        FrameAccess::Denied(reason) => {
            debug!(
                %parent,
                frame_selector = rule.frame_selector,
                %reason,
                "scoped frame not accessible, left to remote execution"
            );
            report.deny(parent, reason);
        }
    }
    report
}

fn frames<T: DocumentTree>(tree: &T, doc: DocumentId, selector: &str) -> Vec<T::Element> {
    tree.query(doc, selector).unwrap_or_else(|e| {
        warn!(%doc, "frame lookup failed: {}", e);
        Vec::new()
    })
}
