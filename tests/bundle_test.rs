//! Tests for page bundles and end-to-end runs through the service container
use std::fs;
use std::io;

use tempfile::TempDir;

use domprune::config::Settings;
use domprune::domain::{DirectiveSet, DocumentTree};
use domprune::infrastructure::bundle::PageBundle;
use domprune::infrastructure::di::ServiceContainer;
use domprune::infrastructure::traits::{ManualClock, RealFileSystem};
use domprune::infrastructure::InfraError;
use domprune::util::testing::{self, write_bundle};

const MANIFEST: &str = r#"
top = "https://news.example/"

[[document]]
url = "https://news.example/"
file = "index.html"

[[document]]
url = "https://news.example/comments"
file = "comments.html"

[[document]]
url = "https://ads.example/slot"
file = "ads/slot.html"
load_after_ms = 1500

[[insert]]
at_ms = 2500
document = "https://news.example/"
html = '<div class="ad-banner">late</div>'
"#;

const INDEX: &str = r#"<html><body>
<div class="ad-banner">buy</div>
<article>story</article>
<iframe id="comments" src="/comments"></iframe>
<iframe id="slot" src="https://ads.example/slot"></iframe>
</body></html>"#;

const COMMENTS: &str =
    r#"<html><body><p class="reply">one</p><p class="reply">two</p></body></html>"#;

const SLOT: &str = r#"<html><body><div class="ad-banner">slot</div></body></html>"#;

fn news_bundle(dir: &TempDir) {
    write_bundle(
        dir.path(),
        MANIFEST,
        &[
            ("index.html", INDEX),
            ("comments.html", COMMENTS),
            ("ads/slot.html", SLOT),
        ],
    )
    .unwrap();
}

#[test]
fn given_bundle_when_building_page_then_delayed_document_is_not_loaded_yet() {
    // Arrange
    let dir = TempDir::new().unwrap();
    news_bundle(&dir);
    let fs = RealFileSystem;

    // Act
    let bundle = PageBundle::open(&fs, dir.path()).unwrap();
    let page = bundle.build_page(&fs).unwrap();

    // Assert
    assert_eq!(bundle.manifest().documents.len(), 3);
    assert_eq!(bundle.manifest().inserts[0].parent, "body");
    assert!(page.document_by_url("https://news.example/comments").is_some());
    assert!(page.document_by_url("https://ads.example/slot").is_none());
    let tree = page.frame_tree().to_string();
    assert!(tree.contains("iframe#comments src=/comments -> https://news.example/comments"));
    assert!(tree.contains("[not loaded]"));
}

#[test]
fn given_bundle_when_running_session_then_all_reachable_matches_are_removed() {
    testing::init_test_setup();
    // Arrange
    let dir = TempDir::new().unwrap();
    news_bundle(&dir);
    let container = ServiceContainer::new(Settings::default());
    let (bundle, mut page) = container.open_bundle(dir.path()).unwrap();
    let directives = DirectiveSet::parse(&[".ad-banner", "iframe#comments .reply"]);
    let mut session = container.session(directives, true);

    // Act
    let stats = session.run(&mut page, &mut ManualClock::new());

    // Assert
    let top = page.top();
    let comments = page.document_by_url("https://news.example/comments").unwrap();
    let slot = page.document_by_url("https://ads.example/slot").unwrap();
    assert_eq!(page.count(top, ".ad-banner"), 0);
    assert_eq!(page.count(comments, ".reply"), 0);
    assert_eq!(page.count(slot, ".ad-banner"), 0);
    assert_eq!(stats.initial, 3);
    assert_eq!(stats.total(), 5);

    let out = TempDir::new().unwrap();
    let written = bundle
        .write_pruned(container.fs.as_ref(), &page, out.path())
        .unwrap();
    assert_eq!(written.len(), 3);
    let index = fs::read_to_string(out.path().join("index.html")).unwrap();
    assert!(!index.contains("ad-banner"));
    assert!(index.contains("<article>story</article>"));
    assert!(out.path().join("ads/slot.html").is_file());
}

#[test]
fn given_remote_disabled_when_running_then_cross_origin_frame_keeps_content() {
    // Arrange
    let dir = TempDir::new().unwrap();
    news_bundle(&dir);
    let container = ServiceContainer::new(Settings::default());
    let (_, mut page) = container.open_bundle(dir.path()).unwrap();
    let mut session = container.session(DirectiveSet::parse(&[".ad-banner"]), false);

    // Act
    let stats = session.run(&mut page, &mut ManualClock::new());

    // Assert
    let slot = page.document_by_url("https://ads.example/slot").unwrap();
    assert_eq!(page.count(slot, ".ad-banner"), 1);
    assert_eq!(stats.remote, 0);
    assert_eq!(stats.dispatches, 0);
}

#[test]
fn given_missing_manifest_when_opening_then_not_found() {
    // Arrange
    let dir = TempDir::new().unwrap();

    // Act
    let result = PageBundle::open(&RealFileSystem, dir.path());

    // Assert
    match result {
        Err(InfraError::Io { source, .. }) => assert_eq!(source.kind(), io::ErrorKind::NotFound),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn given_top_not_listed_when_opening_then_bundle_error() {
    // Arrange
    let dir = TempDir::new().unwrap();
    write_bundle(
        dir.path(),
        r#"
top = "https://news.example/"

[[document]]
url = "https://other.example/"
file = "index.html"
"#,
        &[("index.html", "<body></body>")],
    )
    .unwrap();

    // Act
    let result = PageBundle::open(&RealFileSystem, dir.path());

    // Assert
    assert!(matches!(result, Err(InfraError::Bundle { .. })));
}

#[test]
fn given_delayed_top_document_when_opening_then_bundle_error() {
    // Arrange
    let dir = TempDir::new().unwrap();
    write_bundle(
        dir.path(),
        r#"
top = "https://news.example/"

[[document]]
url = "https://news.example/"
file = "index.html"
load_after_ms = 100
"#,
        &[("index.html", "<body></body>")],
    )
    .unwrap();

    // Act
    let result = PageBundle::open(&RealFileSystem, dir.path());

    // Assert
    assert!(matches!(result, Err(InfraError::Bundle { .. })));
}
