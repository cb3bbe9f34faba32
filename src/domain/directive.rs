//! Selector grammar: raw selector strings to typed directives.
//!
//! Two shapes are recognised:
//! - `iframe#id <selector>` / `iframe.class <selector>`: the element selector
//!   applies only inside frames matching the leading frame selector (and the
//!   frames nested inside them)
//! - anything else: a normal selector that applies in every reachable document
//!
//! Parsing is total. Blank strings become blank normal directives; filtering
//! them out is the executor's job.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Element selector used to discover frames.
pub const FRAME_SELECTOR: &str = "iframe";

fn frame_scoped_regex() -> &'static Regex {
    static FRAME_SCOPED: OnceLock<Regex> = OnceLock::new();
    FRAME_SCOPED.get_or_init(|| Regex::new(r"^iframe([#.][^\s]+)\s+(.+)$").expect("valid regex"))
}

/// One parsed instruction derived from a raw selector string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SelectorDirective {
    /// Applies in every reachable document.
    Normal { selector: String },
    /// Applies only inside frames matching `frame_selector`.
    #[serde(rename_all = "camelCase")]
    FrameScoped {
        frame_selector: String,
        element_selector: String,
    },
}

impl SelectorDirective {
    /// Parse a single raw selector string.
    pub fn parse(raw: &str) -> Self {
        match frame_scoped_regex().captures(raw) {
            Some(caps) => SelectorDirective::FrameScoped {
                frame_selector: format!("{}{}", FRAME_SELECTOR, &caps[1]),
                element_selector: caps[2].to_string(),
            },
            None => SelectorDirective::Normal {
                selector: raw.to_string(),
            },
        }
    }

    /// The selector applied to elements (as opposed to frames).
    pub fn element_selector(&self) -> &str {
        match self {
            SelectorDirective::Normal { selector } => selector,
            SelectorDirective::FrameScoped {
                element_selector, ..
            } => element_selector,
        }
    }

    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, SelectorDirective::FrameScoped { .. })
    }
}

impl fmt::Display for SelectorDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorDirective::Normal { selector } => write!(f, "{}", selector),
            SelectorDirective::FrameScoped {
                frame_selector,
                element_selector,
            } => write!(f, "{} {}", frame_selector, element_selector),
        }
    }
}

/// Parse every raw selector string, preserving order.
pub fn parse<S: AsRef<str>>(raw: &[S]) -> Vec<SelectorDirective> {
    raw.iter()
        .map(|s| SelectorDirective::parse(s.as_ref()))
        .collect()
}

/// A frame-scoped directive borrowed out of a [`DirectiveSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedRule<'a> {
    /// Position among the frame-scoped directives of the set.
    pub lane: usize,
    pub frame_selector: &'a str,
    pub element_selector: &'a str,
}

/// Ordered directives passed to the engine for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveSet {
    directives: Vec<SelectorDirective>,
}

impl DirectiveSet {
    pub fn new(directives: Vec<SelectorDirective>) -> Self {
        Self { directives }
    }

    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        Self::new(parse(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectorDirective> {
        self.directives.iter()
    }

    /// Selectors of the normal directives, in order.
    pub fn normal(&self) -> Vec<&str> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                SelectorDirective::Normal { selector } => Some(selector.as_str()),
                SelectorDirective::FrameScoped { .. } => None,
            })
            .collect()
    }

    /// Frame-scoped directives, in order, each tagged with its lane.
    pub fn frame_scoped(&self) -> Vec<ScopedRule<'_>> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                SelectorDirective::FrameScoped {
                    frame_selector,
                    element_selector,
                } => Some((frame_selector.as_str(), element_selector.as_str())),
                SelectorDirective::Normal { .. } => None,
            })
            .enumerate()
            .map(|(lane, (frame_selector, element_selector))| ScopedRule {
                lane,
                frame_selector,
                element_selector,
            })
            .collect()
    }

    /// Every element selector, frame-scoped ones first, for passes running
    /// inside a document that cannot tell which frame rule selected it.
    pub fn element_selectors(&self) -> Vec<&str> {
        self.frame_scoped()
            .iter()
            .map(|rule| rule.element_selector)
            .chain(self.normal())
            .collect()
    }
}

impl From<Vec<SelectorDirective>> for DirectiveSet {
    fn from(directives: Vec<SelectorDirective>) -> Self {
        Self::new(directives)
    }
}

impl<'a> IntoIterator for &'a DirectiveSet {
    type Item = &'a SelectorDirective;
    type IntoIter = std::slice::Iter<'a, SelectorDirective>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_iframe_id_prefix_when_parsing_then_returns_frame_scoped() {
        let parsed = parse(&["iframe#ad panel"]);
        assert_eq!(
            parsed,
            vec![SelectorDirective::FrameScoped {
                frame_selector: "iframe#ad".to_string(),
                element_selector: "panel".to_string(),
            }]
        );
    }

    #[rstest]
    #[case(".x")]
    #[case("")]
    #[case("   ")]
    #[case("iframe")]
    #[case("iframe #ad .x")]
    #[case("iframe#ad")]
    #[case("div iframe#ad .x")]
    fn given_non_scoped_shape_when_parsing_then_returns_normal(#[case] raw: &str) {
        let parsed = SelectorDirective::parse(raw);
        assert_eq!(
            parsed,
            SelectorDirective::Normal {
                selector: raw.to_string()
            }
        );
    }

    #[test]
    fn given_class_scoped_frame_with_compound_rest_when_parsing_then_keeps_rest_verbatim() {
        let parsed = SelectorDirective::parse("iframe.player-frame  .ad > span");
        assert_eq!(
            parsed,
            SelectorDirective::FrameScoped {
                frame_selector: "iframe.player-frame".to_string(),
                element_selector: ".ad > span".to_string(),
            }
        );
    }

    #[test]
    fn given_mixed_set_when_partitioning_then_keeps_order_and_lanes() {
        let set = DirectiveSet::parse(&[".a", "iframe#x .b", ".c", "iframe.y .d"]);

        assert_eq!(set.normal(), vec![".a", ".c"]);
        let scoped = set.frame_scoped();
        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped[0].lane, 0);
        assert_eq!(scoped[0].frame_selector, "iframe#x");
        assert_eq!(scoped[1].lane, 1);
        assert_eq!(scoped[1].element_selector, ".d");
    }

    #[test]
    fn given_frame_scoped_directive_when_serialized_then_uses_tagged_camel_case() {
        let directive = SelectorDirective::parse("iframe#comments .reply");
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["type"], "frameScoped");
        assert_eq!(json["frameSelector"], "iframe#comments");
        assert_eq!(json["elementSelector"], ".reply");
        assert_eq!(directive.to_string(), "iframe#comments .reply");
    }
}
