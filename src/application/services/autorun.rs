//! Passive auto-run: documents that prune themselves on load.
//!
//! Documents whose location starts with one of the configured prefixes (by
//! default extension-hosted pages) apply every element selector to
//! themselves, without descending into frames, and are then observed.

use tracing::{debug, instrument};

use crate::application::services::pruner;
use crate::application::services::traversal::TraversalReport;
use crate::domain::{DirectiveSet, DocumentTree};

/// Location prefixes that trigger the passive path by default.
pub const DEFAULT_PASSIVE_PREFIXES: &[&str] = &["chrome-extension://"];

/// Prune every document whose location matches one of `prefixes`.
#[instrument(level = "debug", skip(tree, directives))]
pub fn passive_pass<T, S>(
    tree: &mut T,
    directives: &DirectiveSet,
    prefixes: &[S],
) -> TraversalReport
where
    T: DocumentTree,
    S: AsRef<str> + std::fmt::Debug,
{
    let selectors = directives.element_selectors();
    let mut report = TraversalReport::default();

    for doc in tree.documents() {
        let matched = tree
            .location(doc)
            .is_some_and(|loc| prefixes.iter().any(|p| loc.starts_with(p.as_ref())));
        if !matched {
            continue;
        }
        let removed = pruner::apply_all(tree, doc, &selectors);
        debug!(%doc, removed, "passive pass");
        report.removed += removed;
        report.reach(doc, &selectors, false);
    }
    report
}
