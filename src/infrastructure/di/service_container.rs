//! Service container for dependency injection
//!
//! Wires up stores, pages and sessions with their dependencies.

use std::path::Path;
use std::sync::Arc;

use crate::application::services::{InProcessExecutor, PruneSession};
use crate::config::Settings;
use crate::domain::DirectiveSet;
use crate::infrastructure::bundle::PageBundle;
use crate::infrastructure::page::Page;
use crate::infrastructure::store::JsonFileStore;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};
use crate::infrastructure::InfraResult;

/// Container holding settings and I/O boundaries.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        let settings = Arc::new(settings);

        Self { settings, fs }
    }

    /// Selector store at `path`, or at the configured location.
    pub fn store(&self, path: Option<&Path>) -> JsonFileStore {
        let path = path.unwrap_or(&self.settings.store_path);
        JsonFileStore::new(path, Arc::clone(&self.fs))
    }

    pub fn open_bundle(&self, dir: &Path) -> InfraResult<(PageBundle, Page)> {
        let bundle = PageBundle::open(self.fs.as_ref(), dir)?;
        let page = bundle.build_page(self.fs.as_ref())?;
        Ok((bundle, page))
    }

    /// Active session over a page, optionally with remote execution.
    pub fn session(&self, directives: DirectiveSet, remote: bool) -> PruneSession<Page> {
        let session = PruneSession::new(directives, self.settings.schedule());
        if remote {
            session.with_executor(Box::new(InProcessExecutor::new()))
        } else {
            session
        }
    }

    /// Passive session for the configured location prefixes.
    pub fn passive_session(&self, directives: DirectiveSet) -> PruneSession<Page> {
        PruneSession::new(directives, self.settings.schedule())
            .passive(&self.settings.passive_prefixes)
    }
}
