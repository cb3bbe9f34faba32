//! Element removal within a single document.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::domain::{DocumentId, DocumentTree, DomainError};

fn compound_class_regex() -> &'static Regex {
    static COMPOUND_CLASS: OnceLock<Regex> = OnceLock::new();
    COMPOUND_CLASS.get_or_init(|| Regex::new(r"\.([^\s.]+)\.([^\s.]+)").expect("valid regex"))
}

/// Rewrite `.a.b` compound-class predicates into `.a .b` descendant form.
///
/// Returns `None` when the selector has no such predicate.
pub fn descendant_rewrite(selector: &str) -> Option<String> {
    match compound_class_regex().replace_all(selector, ".$1 .$2") {
        Cow::Owned(rewritten) => Some(rewritten),
        Cow::Borrowed(_) => None,
    }
}

/// Remove every element of `doc` matching `selector` and return how many went.
///
/// Blank selectors are a no-op. If nothing matches, the compound-class
/// rewrite is tried once. Rejected selectors and stale documents count as 0.
pub fn apply<T: DocumentTree>(tree: &mut T, doc: DocumentId, selector: &str) -> usize {
    let selector = selector.trim();
    if selector.is_empty() {
        return 0;
    }

    let mut matches = lookup(tree, doc, selector);
    if matches.is_empty() {
        if let Some(rewritten) = descendant_rewrite(selector) {
            trace!(%doc, selector, rewritten = %rewritten, "retrying with descendant rewrite");
            matches = lookup(tree, doc, &rewritten);
        }
    }

    let removed = matches
        .into_iter()
        .filter(|element| tree.remove(doc, *element))
        .count();
    if removed > 0 {
        debug!(%doc, selector, removed, "removed elements");
    }
    removed
}

/// Apply each selector in turn, summing the removals.
pub fn apply_all<T, S>(tree: &mut T, doc: DocumentId, selectors: &[S]) -> usize
where
    T: DocumentTree,
    S: AsRef<str>,
{
    selectors
        .iter()
        .map(|selector| apply(tree, doc, selector.as_ref()))
        .sum()
}

fn lookup<T: DocumentTree>(tree: &T, doc: DocumentId, selector: &str) -> Vec<T::Element> {
    match tree.query(doc, selector) {
        Ok(elements) => elements,
        Err(e @ DomainError::InvalidSelector { .. }) => {
            warn!(%doc, "{}", e);
            Vec::new()
        }
        Err(e) => {
            debug!(%doc, "{}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(".a.b", Some(".a .b"))]
    #[case("div.a.b > p", Some("div.a .b > p"))]
    #[case(".a.b.c", Some(".a .b.c"))]
    #[case(".a .b", None)]
    #[case(".a", None)]
    #[case("#main", None)]
    fn given_selector_when_rewriting_then_splits_first_compound_pair(
        #[case] selector: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(descendant_rewrite(selector).as_deref(), expected);
    }
}
