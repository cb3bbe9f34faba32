//! Page bundles: a `bundle.toml` manifest plus the HTML files it names.
//!
//! ```toml
//! top = "https://news.example/"
//!
//! [[document]]
//! url = "https://news.example/"
//! file = "index.html"
//!
//! [[document]]
//! url = "https://ads.example/slot"
//! file = "slot.html"
//! load_after_ms = 1500
//!
//! [[insert]]
//! at_ms = 2500
//! document = "https://news.example/"
//! parent = "body"
//! html = "<div class=\"ad-banner\">late</div>"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::infrastructure::page::Page;
use crate::infrastructure::traits::FileSystem;
use crate::infrastructure::{InfraError, InfraResult};

pub const MANIFEST_FILE: &str = "bundle.toml";

fn default_parent() -> String {
    "body".to_string()
}

/// One document of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub url: String,
    /// HTML file, relative to the bundle directory.
    pub file: PathBuf,
    /// Attach the document this long after session start instead of at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_after_ms: Option<u64>,
}

/// Content appended to a document at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertEntry {
    pub at_ms: u64,
    /// URL of the target document.
    pub document: String,
    /// Selector of the element receiving the content.
    #[serde(default = "default_parent")]
    pub parent: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub top: String,
    #[serde(default, rename = "document")]
    pub documents: Vec<DocumentEntry>,
    #[serde(default, rename = "insert")]
    pub inserts: Vec<InsertEntry>,
}

/// A manifest together with the directory it was read from.
#[derive(Debug, Clone)]
pub struct PageBundle {
    root: PathBuf,
    manifest: BundleManifest,
}

impl PageBundle {
    /// Read and validate `<dir>/bundle.toml`.
    #[instrument(level = "debug", skip(fs))]
    pub fn open(fs: &dyn FileSystem, dir: &Path) -> InfraResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !fs.is_file(&path) {
            return Err(InfraError::io(
                format!("open {}", path.display()),
                io::Error::new(io::ErrorKind::NotFound, "manifest not found"),
            ));
        }
        let content = fs
            .read_to_string(&path)
            .map_err(|e| InfraError::io(format!("read {}", path.display()), e))?;
        let manifest: BundleManifest =
            toml::from_str(&content).map_err(|e| InfraError::bundle(&path, e.to_string()))?;

        let top = manifest
            .documents
            .iter()
            .find(|d| d.url == manifest.top)
            .ok_or_else(|| {
                InfraError::bundle(&path, format!("top document {} is not listed", manifest.top))
            })?;
        if top.load_after_ms.is_some() {
            return Err(InfraError::bundle(&path, "top document cannot load late"));
        }

        debug!(
            documents = manifest.documents.len(),
            inserts = manifest.inserts.len(),
            "manifest loaded"
        );
        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Build the page: immediate documents loaded, delayed loads and inserts
    /// placed on the page timeline.
    pub fn build_page(&self, fs: &dyn FileSystem) -> InfraResult<Page> {
        let top_html = self.read_document(fs, &self.manifest.top)?;
        let mut page = Page::new(&self.manifest.top, &top_html)?;

        for entry in &self.manifest.documents {
            if entry.url == self.manifest.top {
                continue;
            }
            let html = self.read_html(fs, &entry.file)?;
            match entry.load_after_ms {
                Some(ms) => page.schedule_load(Duration::from_millis(ms), &entry.url, &html),
                None => {
                    page.load_document(&entry.url, &html)?;
                }
            }
        }
        for insert in &self.manifest.inserts {
            page.schedule_insert(
                Duration::from_millis(insert.at_ms),
                &insert.document,
                &insert.parent,
                &insert.html,
            );
        }
        Ok(page)
    }

    /// Write the current HTML of every loaded bundle document under `out`,
    /// keeping the bundle's file names. Returns the files written.
    pub fn write_pruned(
        &self,
        fs: &dyn FileSystem,
        page: &Page,
        out: &Path,
    ) -> InfraResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for entry in &self.manifest.documents {
            let Some(html) = page.document_by_url(&entry.url).and_then(|doc| page.html(doc)) else {
                continue;
            };
            let target = out.join(&entry.file);
            fs.ensure_parent(&target)
                .map_err(|e| InfraError::io(format!("create {}", out.display()), e))?;
            fs.write(&target, &html)
                .map_err(|e| InfraError::io(format!("write {}", target.display()), e))?;
            written.push(target);
        }
        Ok(written)
    }

    fn read_document(&self, fs: &dyn FileSystem, url: &str) -> InfraResult<String> {
        match self.manifest.documents.iter().find(|d| d.url == url) {
            Some(entry) => self.read_html(fs, &entry.file),
            None => Err(InfraError::bundle(
                self.root.join(MANIFEST_FILE),
                format!("document {url} is not listed"),
            )),
        }
    }

    fn read_html(&self, fs: &dyn FileSystem, file: &Path) -> InfraResult<String> {
        let path = self.root.join(file);
        fs.read_to_string(&path)
            .map_err(|e| InfraError::io(format!("read {}", path.display()), e))
    }
}
