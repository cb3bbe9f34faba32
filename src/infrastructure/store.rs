//! Selector store implementations.
//!
//! The engine only ever reads the store. [`JsonFileStore`] reads a JSON object
//! mapping keys to string lists, e.g. `{"selectors": [".ad", "iframe#c .x"]}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::infrastructure::traits::{FileSystem, SelectorStore};

/// Store backed by a JSON file. A missing file holds no entries.
pub struct JsonFileStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SelectorStore for JsonFileStore {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn read(&self, key: &str) -> ApplicationResult<Option<Vec<String>>> {
        if !self.fs.exists(&self.path) {
            debug!("store file absent");
            return Ok(None);
        }
        let content = self
            .fs
            .read_to_string(&self.path)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("read selector store {}", self.path.display()),
                source: Box::new(e),
            })?;
        let root: Value = serde_json::from_str(&content).map_err(|e| ApplicationError::Store {
            message: format!("{}: {}", self.path.display(), e),
        })?;

        match root.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(ApplicationError::Store {
                        message: format!("{key}: expected string, found {other}"),
                    }),
                })
                .collect::<ApplicationResult<Vec<String>>>()
                .map(Some),
            Some(other) => Err(ApplicationError::Store {
                message: format!("{key}: expected list of strings, found {other}"),
            }),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry<S: AsRef<str>>(mut self, key: &str, selectors: &[S]) -> Self {
        self.insert(key, selectors);
        self
    }

    pub fn insert<S: AsRef<str>>(&mut self, key: &str, selectors: &[S]) {
        self.entries.insert(
            key.to_string(),
            selectors.iter().map(|s| s.as_ref().to_string()).collect(),
        );
    }
}

impl SelectorStore for MemoryStore {
    fn read(&self, key: &str) -> ApplicationResult<Option<Vec<String>>> {
        Ok(self.entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::traits::RealFileSystem;
    use tempfile::TempDir;

    fn store_with(content: &str) -> (TempDir, JsonFileStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(&path, content).unwrap();
        let store = JsonFileStore::new(path, Arc::new(RealFileSystem));
        (dir, store)
    }

    #[test]
    fn given_json_object_when_reading_key_then_returns_list() {
        let (_dir, store) = store_with(r#"{"selectors": [".ad", "iframe#c .x"]}"#);

        let result = store.read("selectors").unwrap();

        assert_eq!(result, Some(vec![".ad".to_string(), "iframe#c .x".to_string()]));
    }

    #[test]
    fn given_missing_file_when_reading_then_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope.json"), Arc::new(RealFileSystem));

        assert_eq!(store.read("selectors").unwrap(), None);
    }

    #[test]
    fn given_malformed_json_when_reading_then_returns_store_error() {
        let (_dir, store) = store_with("{not json");

        let result = store.read("selectors");

        assert!(matches!(result, Err(ApplicationError::Store { .. })));
    }

    #[test]
    fn given_non_string_item_when_reading_then_returns_store_error() {
        let (_dir, store) = store_with(r#"{"selectors": [".ad", 3]}"#);

        assert!(store.read("selectors").is_err());
        assert_eq!(store.read("other").unwrap(), None);
    }
}
