//! In-memory page host built on `scraper`.
//!
//! A [`Page`] owns every document of one page in a generational arena. Frame
//! elements resolve to documents by their `src` URL: same origin is
//! accessible, another known origin is denied as cross-origin, and unknown or
//! not-yet-loaded targets are denied as not loaded. Frames without a `src` (or
//! pointing at `about:blank`) get their own blank document that inherits the
//! embedding document's origin.
//!
//! A page may carry a timeline of delayed frame loads and content insertions,
//! applied by [`PageHost::advance_to`].

use std::collections::HashMap;
use std::time::Duration;

use ego_tree::{NodeId, NodeRef};
use generational_arena::Arena;
use itertools::Itertools;
use scraper::{Html, Node, Selector};
use termtree::Tree;
use tracing::{debug, instrument, trace, warn};
use url::{Origin, Url};

use crate::application::services::PageHost;
use crate::application::ApplicationError;
use crate::domain::{
    DenialReason, DocumentId, DocumentTree, DomainError, DomainResult, FrameAccess,
    BLANK_LOCATION, FRAME_SELECTOR,
};
use crate::infrastructure::{InfraError, InfraResult};

#[derive(Debug)]
struct LoadedDocument {
    location: String,
    /// Base for resolving frame sources; blank documents inherit their parent's.
    base: Option<Url>,
    origin: Origin,
    html: Html,
    blank_frames: HashMap<NodeId, DocumentId>,
}

impl LoadedDocument {
    fn is_attached(&self, node: NodeId) -> bool {
        let root = self.html.tree.root().id();
        self.html
            .tree
            .get(node)
            .is_some_and(|n| n.ancestors().any(|a| a.id() == root))
    }

    fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.html
            .root_element()
            .select(selector)
            .map(|el| el.id())
            .collect()
    }

    /// Attached frames that need a blank document and do not have one yet.
    fn unbound_blank_frames(&self) -> Vec<NodeId> {
        let Ok(selector) = Selector::parse(FRAME_SELECTOR) else {
            return Vec::new();
        };
        self.html
            .root_element()
            .select(&selector)
            .filter(|el| is_blank_src(el.value().attr("src")))
            .map(|el| el.id())
            .filter(|id| !self.blank_frames.contains_key(id))
            .collect()
    }

    fn frame_src(&self, frame: NodeId) -> Option<&str> {
        self.html
            .tree
            .get(frame)?
            .value()
            .as_element()?
            .attr("src")
    }
}

fn is_blank_src(src: Option<&str>) -> bool {
    match src.map(str::trim) {
        None => true,
        Some(s) => s.is_empty() || s.eq_ignore_ascii_case(BLANK_LOCATION),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageEvent {
    Load { url: String, html: String },
    Insert { url: String, parent: String, html: String },
}

#[derive(Debug, Clone)]
struct Scheduled {
    at: Duration,
    event: PageEvent,
}

/// A page and all of its frame documents.
#[derive(Debug)]
pub struct Page {
    docs: Arena<LoadedDocument>,
    by_url: HashMap<String, DocumentId>,
    top: DocumentId,
    mutations: Vec<DocumentId>,
    timeline: Vec<Scheduled>,
}

impl Page {
    /// Create a page whose top document is `html` served from `top_url`.
    pub fn new(top_url: &str, html: &str) -> InfraResult<Self> {
        let url = parse_url(top_url)?;
        let mut docs = Arena::new();
        let top = DocumentId::new(docs.insert(LoadedDocument {
            location: url.to_string(),
            origin: url.origin(),
            base: Some(url.clone()),
            html: Html::parse_document(html),
            blank_frames: HashMap::new(),
        }));

        let mut page = Self {
            docs,
            by_url: HashMap::from([(url.to_string(), top)]),
            top,
            mutations: Vec::new(),
            timeline: Vec::new(),
        };
        page.bind_blank_frames(top);
        Ok(page)
    }

    /// Load another document of the page from `url`.
    #[instrument(level = "debug", skip(self, html))]
    pub fn load_document(&mut self, url: &str, html: &str) -> InfraResult<DocumentId> {
        let url = parse_url(url)?;
        if self.by_url.contains_key(url.as_str()) {
            return Err(InfraError::PageLoad {
                url: url.to_string(),
                message: "document already loaded".to_string(),
            });
        }
        let doc = DocumentId::new(self.docs.insert(LoadedDocument {
            location: url.to_string(),
            origin: url.origin(),
            base: Some(url.clone()),
            html: Html::parse_document(html),
            blank_frames: HashMap::new(),
        }));
        self.by_url.insert(url.to_string(), doc);
        self.bind_blank_frames(doc);
        debug!(%doc, "document loaded");
        Ok(doc)
    }

    /// Load `url` once the page clock reaches `at`.
    pub fn schedule_load(&mut self, at: Duration, url: &str, html: &str) {
        self.schedule(
            at,
            PageEvent::Load {
                url: url.to_string(),
                html: html.to_string(),
            },
        );
    }

    /// Append `html` to the first `parent` match of `url` once the clock reaches `at`.
    pub fn schedule_insert(&mut self, at: Duration, url: &str, parent: &str, html: &str) {
        self.schedule(
            at,
            PageEvent::Insert {
                url: url.to_string(),
                parent: parent.to_string(),
                html: html.to_string(),
            },
        );
    }

    /// Append parsed `html` as the last children of the first element
    /// matching `parent`, recording a child-list mutation. Returns the number
    /// of nodes added.
    pub fn append_html(&mut self, doc: DocumentId, parent: &str, html: &str) -> InfraResult<usize> {
        let added = self.graft_html(doc, parent, html)?;
        self.mutations.push(doc);
        Ok(added)
    }

    /// Like [`append_html`](Self::append_html), but no mutation is recorded,
    /// as when a placeholder is written to from outside the observed tree.
    pub fn append_html_unobserved(
        &mut self,
        doc: DocumentId,
        parent: &str,
        html: &str,
    ) -> InfraResult<usize> {
        self.graft_html(doc, parent, html)
    }

    fn graft_html(&mut self, doc: DocumentId, parent: &str, html: &str) -> InfraResult<usize> {
        let selector = Selector::parse(parent).map_err(|e| {
            domain_error(DomainError::InvalidSelector {
                selector: parent.to_string(),
                reason: e.to_string(),
            })
        })?;
        let entry = self
            .docs
            .get_mut(doc.index())
            .ok_or_else(|| domain_error(DomainError::UnknownDocument(doc)))?;
        let Some(target) = entry.select(&selector).into_iter().next() else {
            return Err(InfraError::PageLoad {
                url: entry.location.clone(),
                message: format!("no element matches {parent:?}"),
            });
        };

        let fragment = Html::parse_fragment(html);
        let added = graft(&mut entry.html.tree, target, *fragment.root_element());
        self.bind_blank_frames(doc);
        trace!(%doc, added, "content appended");
        Ok(added)
    }

    pub fn document_by_url(&self, url: &str) -> Option<DocumentId> {
        let url = Url::parse(url).ok()?;
        self.by_url.get(url.as_str()).copied()
    }

    /// Serialized HTML of `doc`.
    pub fn html(&self, doc: DocumentId) -> Option<String> {
        self.docs.get(doc.index()).map(|d| d.html.html())
    }

    /// Number of attached elements of `doc` matching `selector`.
    pub fn count(&self, doc: DocumentId, selector: &str) -> usize {
        self.query(doc, selector).map(|found| found.len()).unwrap_or(0)
    }

    /// Documents loaded from a URL (blank frame documents excluded).
    pub fn named_documents(&self) -> Vec<(String, DocumentId)> {
        self.by_url
            .iter()
            .map(|(url, doc)| (url.clone(), *doc))
            .sorted()
            .collect()
    }

    /// Frame hierarchy starting at the top document.
    pub fn frame_tree(&self) -> Tree<String> {
        let mut path = Vec::new();
        let label = self.location(self.top).unwrap_or_default().to_string();
        self.frame_subtree(self.top, label, &mut path)
    }

    fn frame_subtree(
        &self,
        doc: DocumentId,
        label: String,
        path: &mut Vec<DocumentId>,
    ) -> Tree<String> {
        if path.contains(&doc) {
            return Tree::new(format!("{label} (cycle)"));
        }
        path.push(doc);
        let mut leaves = Vec::new();
        for frame in self.query(doc, FRAME_SELECTOR).unwrap_or_default() {
            let name = self.describe_frame(doc, frame);
            let leaf = match self.frame_document(doc, frame) {
                FrameAccess::Accessible(child) => {
                    let loc = self.location(child).unwrap_or_default();
                    self.frame_subtree(child, format!("{name} -> {loc}"), path)
                }
                FrameAccess::Denied(reason) => Tree::new(format!("{name} [{reason}]")),
            };
            leaves.push(leaf);
        }
        path.pop();
        Tree::new(label).with_leaves(leaves)
    }

    fn describe_frame(&self, doc: DocumentId, frame: NodeId) -> String {
        let element = self
            .docs
            .get(doc.index())
            .and_then(|d| d.html.tree.get(frame))
            .and_then(|n| n.value().as_element().cloned());
        let Some(element) = element else {
            return FRAME_SELECTOR.to_string();
        };
        let mut name = FRAME_SELECTOR.to_string();
        if let Some(id) = element.id() {
            name.push('#');
            name.push_str(id);
        }
        for class in element.classes() {
            name.push('.');
            name.push_str(class);
        }
        match element.attr("src") {
            Some(src) if !is_blank_src(Some(src)) => format!("{name} src={src}"),
            _ => name,
        }
    }

    fn schedule(&mut self, at: Duration, event: PageEvent) {
        let pos = self.timeline.partition_point(|s| s.at <= at);
        self.timeline.insert(pos, Scheduled { at, event });
    }

    fn apply(&mut self, event: PageEvent) {
        match event {
            PageEvent::Load { url, html } => {
                if let Err(e) = self.load_document(&url, &html) {
                    warn!("delayed load skipped: {}", e);
                }
            }
            PageEvent::Insert { url, parent, html } => {
                let Some(doc) = self.document_by_url(&url) else {
                    warn!(url, "insert into unloaded document skipped");
                    return;
                };
                if let Err(e) = self.append_html(doc, &parent, &html) {
                    warn!("insert skipped: {}", e);
                }
            }
        }
    }

    fn bind_blank_frames(&mut self, doc: DocumentId) {
        let Some(entry) = self.docs.get(doc.index()) else {
            return;
        };
        let frames = entry.unbound_blank_frames();
        let base = entry.base.clone();
        let origin = entry.origin.clone();

        for frame in frames {
            let blank = DocumentId::new(self.docs.insert(LoadedDocument {
                location: BLANK_LOCATION.to_string(),
                base: base.clone(),
                origin: origin.clone(),
                html: Html::parse_document(""),
                blank_frames: HashMap::new(),
            }));
            if let Some(entry) = self.docs.get_mut(doc.index()) {
                entry.blank_frames.insert(frame, blank);
            }
            trace!(%doc, %blank, "blank frame document created");
        }
    }
}

fn domain_error(e: DomainError) -> InfraError {
    ApplicationError::from(e).into()
}

fn parse_url(raw: &str) -> InfraResult<Url> {
    Url::parse(raw).map_err(|e| InfraError::PageLoad {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

/// Copy the children of `source` under `parent`. Returns the nodes copied.
fn graft(tree: &mut ego_tree::Tree<Node>, parent: NodeId, source: NodeRef<'_, Node>) -> usize {
    let mut added = 0;
    for child in source.children() {
        let Some(mut parent_node) = tree.get_mut(parent) else {
            return added;
        };
        let id = parent_node.append(child.value().clone()).id();
        added += 1 + graft(tree, id, child);
    }
    added
}

impl DocumentTree for Page {
    type Element = NodeId;

    fn top(&self) -> DocumentId {
        self.top
    }

    fn documents(&self) -> Vec<DocumentId> {
        self.docs.iter().map(|(idx, _)| DocumentId::new(idx)).collect()
    }

    fn location(&self, doc: DocumentId) -> Option<&str> {
        self.docs.get(doc.index()).map(|d| d.location.as_str())
    }

    fn has_body(&self, doc: DocumentId) -> bool {
        match Selector::parse("body") {
            Ok(body) => self
                .docs
                .get(doc.index())
                .is_some_and(|d| !d.select(&body).is_empty()),
            Err(_) => false,
        }
    }

    fn query(&self, doc: DocumentId, selector: &str) -> DomainResult<Vec<NodeId>> {
        let entry = self
            .docs
            .get(doc.index())
            .ok_or(DomainError::UnknownDocument(doc))?;
        let parsed = Selector::parse(selector).map_err(|e| DomainError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        Ok(entry.select(&parsed))
    }

    fn remove(&mut self, doc: DocumentId, element: NodeId) -> bool {
        let Some(entry) = self.docs.get_mut(doc.index()) else {
            return false;
        };
        let has_parent = entry
            .html
            .tree
            .get(element)
            .is_some_and(|node| node.parent().is_some());
        if !has_parent {
            return false;
        }
        let attached = entry.is_attached(element);
        if let Some(mut node) = entry.html.tree.get_mut(element) {
            node.detach();
        }
        // Detaching inside an already removed subtree changes no live child list.
        if attached {
            self.mutations.push(doc);
        }
        true
    }

    fn frame_document(&self, doc: DocumentId, frame: NodeId) -> FrameAccess {
        let Some(child) = self.frame_target(doc, frame) else {
            return FrameAccess::Denied(DenialReason::NotLoaded);
        };
        let same_origin = match (self.docs.get(doc.index()), self.docs.get(child.index())) {
            (Some(parent), Some(target)) => parent.origin == target.origin,
            _ => false,
        };
        if same_origin {
            FrameAccess::Accessible(child)
        } else {
            FrameAccess::Denied(DenialReason::CrossOrigin)
        }
    }

    fn frame_target(&self, doc: DocumentId, frame: NodeId) -> Option<DocumentId> {
        let entry = self.docs.get(doc.index())?;
        if !entry.is_attached(frame) {
            return None;
        }
        if let Some(&blank) = entry.blank_frames.get(&frame) {
            return self.docs.contains(blank.index()).then_some(blank);
        }
        let target = entry
            .frame_src(frame)
            .and_then(|src| entry.base.as_ref()?.join(src.trim()).ok())?;
        self.by_url
            .get(target.as_str())
            .copied()
            .filter(|id| self.docs.contains(id.index()))
    }

    fn take_mutations(&mut self) -> Vec<DocumentId> {
        std::mem::take(&mut self.mutations)
            .into_iter()
            .unique()
            .collect()
    }
}

impl PageHost for Page {
    fn next_activity(&self) -> Option<Duration> {
        self.timeline.first().map(|s| s.at)
    }

    fn advance_to(&mut self, now: Duration) {
        let due = self.timeline.partition_point(|s| s.at <= now);
        let events: Vec<Scheduled> = self.timeline.drain(..due).collect();
        for scheduled in events {
            debug!(at_ms = scheduled.at.as_millis() as u64, "page event");
            self.apply(scheduled.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: &str = "https://news.example/";

    #[test]
    fn given_same_origin_frame_when_resolving_then_accessible() {
        let html = r#"<body><iframe id="c" src="/comments"></iframe></body>"#;
        let mut page = Page::new(TOP, html).unwrap();
        let child = page
            .load_document("https://news.example/comments", "<body><p>hi</p></body>")
            .unwrap();

        let frame = page.query(page.top(), "iframe").unwrap()[0];

        assert_eq!(page.frame_document(page.top(), frame), FrameAccess::Accessible(child));
    }

    #[test]
    fn given_other_origin_or_unknown_frame_when_resolving_then_denied() {
        let mut page = Page::new(
            TOP,
            r#"<body>
                <iframe src="https://ads.example/slot"></iframe>
                <iframe src="/missing"></iframe>
            </body>"#,
        )
        .unwrap();
        page.load_document("https://ads.example/slot", "<body></body>").unwrap();

        let frames = page.query(page.top(), "iframe").unwrap();

        assert_eq!(
            page.frame_document(page.top(), frames[0]),
            FrameAccess::Denied(DenialReason::CrossOrigin)
        );
        assert_eq!(
            page.frame_document(page.top(), frames[1]),
            FrameAccess::Denied(DenialReason::NotLoaded)
        );
    }

    #[test]
    fn given_srcless_frame_when_resolving_then_blank_document_with_parent_origin() {
        let page = Page::new(TOP, "<body><iframe></iframe></body>").unwrap();
        let frame = page.query(page.top(), "iframe").unwrap()[0];

        let FrameAccess::Accessible(blank) = page.frame_document(page.top(), frame) else {
            panic!("blank frame should be accessible");
        };

        assert!(page.is_blank(blank));
        assert!(page.has_body(blank));
        assert_eq!(page.documents().len(), 2);
    }

    #[test]
    fn given_removed_element_when_removing_again_then_returns_false() {
        let mut page = Page::new(TOP, r#"<body><div class="ad"></div></body>"#).unwrap();
        let ad = page.query(page.top(), ".ad").unwrap()[0];

        assert!(page.remove(page.top(), ad));
        assert!(!page.remove(page.top(), ad));
        assert_eq!(page.count(page.top(), ".ad"), 0);
        assert_eq!(page.take_mutations(), vec![page.top()]);
        assert!(page.take_mutations().is_empty());
    }

    #[test]
    fn given_nested_matches_when_removing_outer_first_then_inner_still_counts() {
        let html = r#"<body><div class="ad"><div class="ad"></div></div></body>"#;
        let mut page = Page::new(TOP, html).unwrap();
        let ads = page.query(page.top(), ".ad").unwrap();

        assert!(page.remove(page.top(), ads[0]));
        assert!(page.remove(page.top(), ads[1]));
        assert!(!page.remove(page.top(), ads[1]));
        assert_eq!(page.take_mutations(), vec![page.top()]);
    }

    #[test]
    fn given_cross_origin_frame_when_targeting_then_resolves_unless_detached() {
        let html = r#"<body><iframe src="https://ads.example/slot"></iframe></body>"#;
        let mut page = Page::new(TOP, html).unwrap();
        let slot = page.load_document("https://ads.example/slot", "<body></body>").unwrap();
        let frame = page.query(page.top(), "iframe").unwrap()[0];

        assert_eq!(page.frame_target(page.top(), frame), Some(slot));
        page.remove(page.top(), frame);
        assert_eq!(page.frame_target(page.top(), frame), None);
    }

    #[test]
    fn given_scheduled_insert_when_advancing_then_content_appears_with_mutation() {
        let mut page = Page::new(TOP, "<body></body>").unwrap();
        page.schedule_insert(
            Duration::from_millis(2500),
            TOP,
            "body",
            r#"<div class="ad-banner">late</div>"#,
        );

        page.advance_to(Duration::from_millis(2000));
        assert_eq!(page.count(page.top(), ".ad-banner"), 0);
        assert_eq!(page.next_activity(), Some(Duration::from_millis(2500)));

        page.advance_to(Duration::from_millis(2500));
        assert_eq!(page.count(page.top(), ".ad-banner"), 1);
        assert_eq!(page.take_mutations(), vec![page.top()]);
        assert_eq!(page.next_activity(), None);
    }

    #[test]
    fn given_invalid_selector_when_querying_then_returns_invalid_selector() {
        let page = Page::new(TOP, "<body></body>").unwrap();

        let result = page.query(page.top(), "div[");

        assert!(matches!(result, Err(DomainError::InvalidSelector { .. })));
    }

    #[test]
    fn given_nested_frames_when_rendering_tree_then_shows_access() {
        let mut page = Page::new(
            TOP,
            r#"<body>
                <iframe id="c" src="/c"></iframe>
                <iframe src="https://ads.example/"></iframe>
            </body>"#,
        )
        .unwrap();
        page.load_document("https://news.example/c", "<body><iframe></iframe></body>")
            .unwrap();

        let rendered = page.frame_tree().to_string();

        assert!(rendered.contains("iframe#c src=/c -> https://news.example/c"));
        assert!(rendered.contains("about:blank"));
        assert!(rendered.contains("[not loaded]"));
    }
}
