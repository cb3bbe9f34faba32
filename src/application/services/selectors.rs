//! Reading directives from the selector store.

use tracing::{debug, warn};

use crate::domain::DirectiveSet;
use crate::infrastructure::traits::SelectorStore;

/// Store key holding the selector list.
pub const SELECTORS_KEY: &str = "selectors";

/// Read and parse the selector list stored under `key`.
///
/// A missing entry is an empty list; a failing store is logged and also
/// yields an empty list, turning the invocation into a no-op pass.
pub fn load_directives(store: &dyn SelectorStore, key: &str) -> DirectiveSet {
    match store.read(key) {
        Ok(Some(raw)) => {
            debug!(key, count = raw.len(), "selectors loaded");
            DirectiveSet::parse(&raw)
        }
        Ok(None) => {
            debug!(key, "no stored selectors");
            DirectiveSet::default()
        }
        Err(e) => {
            warn!(key, "cannot read selector store, continuing without directives: {}", e);
            DirectiveSet::default()
        }
    }
}

/// Like [`load_directives`], but a missing entry falls back to `default_selector`.
pub fn load_passive_directives(
    store: &dyn SelectorStore,
    key: &str,
    default_selector: &str,
) -> DirectiveSet {
    match store.read(key) {
        Ok(Some(raw)) => DirectiveSet::parse(&raw),
        Ok(None) => DirectiveSet::parse(&[default_selector]),
        Err(e) => {
            warn!(key, "cannot read selector store, continuing without directives: {}", e);
            DirectiveSet::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ApplicationError, ApplicationResult};
    use crate::infrastructure::store::MemoryStore;

    struct BrokenStore;

    impl SelectorStore for BrokenStore {
        fn read(&self, _key: &str) -> ApplicationResult<Option<Vec<String>>> {
            Err(ApplicationError::Store {
                message: "quota exceeded".to_string(),
            })
        }
    }

    #[test]
    fn given_broken_store_when_loading_then_returns_empty_set() {
        assert!(load_directives(&BrokenStore, SELECTORS_KEY).is_empty());
        assert!(load_passive_directives(&BrokenStore, SELECTORS_KEY, ".x").is_empty());
    }

    #[test]
    fn given_missing_entry_when_loading_passive_then_uses_default_selector() {
        let store = MemoryStore::new();

        let active = load_directives(&store, SELECTORS_KEY);
        let passive = load_passive_directives(&store, SELECTORS_KEY, ".sc-gzOgki.ksYuOU");

        assert!(active.is_empty());
        assert_eq!(passive.normal(), vec![".sc-gzOgki.ksYuOU"]);
    }

    #[test]
    fn given_stored_list_when_loading_then_parses_in_order() {
        let store = MemoryStore::new().with_entry(SELECTORS_KEY, &[".ad", "iframe#c .reply"]);

        let set = load_directives(&store, SELECTORS_KEY);

        assert_eq!(set.len(), 2);
        assert_eq!(set.normal(), vec![".ad"]);
        assert_eq!(set.frame_scoped()[0].element_selector, ".reply");
    }
}
