//! Builds anchors from live selections.

use std::sync::OnceLock;

use regex::Regex;

use super::text_index::TextIndex;
use crate::document::{selector, Document, NodeId, Selector, TextRange};
use crate::error::{Error, Result};
use crate::models::{Anchor, TextQuote, CONTEXT_CHARS, MIN_SELECTION_CHARS};
use crate::render::WRAPPER_CLASS;
use crate::util::char_len;

const PAGE_NUMBER_ATTR: &str = "data-page-number";

/// Turns a selection into a relocatable [`Anchor`].
#[derive(Debug, Clone, Copy)]
pub struct AnchorBuilder {
    context_chars: usize,
    min_selection_chars: usize,
}

impl Default for AnchorBuilder {
    fn default() -> Self {
        Self {
            context_chars: CONTEXT_CHARS,
            min_selection_chars: MIN_SELECTION_CHARS,
        }
    }
}

impl AnchorBuilder {
    pub const fn new(context_chars: usize, min_selection_chars: usize) -> Self {
        Self {
            context_chars,
            min_selection_chars,
        }
    }

    /// Build an anchor for `range` inside `root`.
    ///
    /// Returns `None` when the selection is collapsed, too short, reaches
    /// outside `root`, or has no enclosing element.
    pub fn build(&self, doc: &Document, root: NodeId, range: &TextRange) -> Option<Anchor> {
        if range.is_collapsed() {
            return None;
        }
        if !doc.contains(root, range.start.node) || !doc.contains(root, range.end.node) {
            tracing::debug!("Selection reaches outside the content root");
            return None;
        }

        let selected_text = range.text(doc);
        if selected_text.trim().chars().count() < self.min_selection_chars {
            tracing::debug!(
                "Selection too short to anchor ({} chars)",
                selected_text.trim().chars().count()
            );
            return None;
        }

        let start_element = enclosing_element(doc, root, range.start.node)?;
        let end_element = enclosing_element(doc, root, range.end.node)?;
        let element = if start_element == end_element {
            start_element
        } else {
            let ancestor = range.common_ancestor(doc)?;
            enclosing_element(doc, root, ancestor)?
        };

        let selector = locator_for(doc, root, element);

        let root_index = TextIndex::build(doc, root);
        let start = root_index.position_of(range.start)?;
        let end = root_index.position_of(range.end)?;
        let before_text = root_index.before(start, self.context_chars);
        let after_text = root_index.after(end, self.context_chars);

        let (start_offset, end_offset) = element_offsets(doc, element, range, &selected_text);

        Some(Anchor {
            selector,
            start_offset,
            end_offset,
            page_number: page_number(doc, start_element),
            text_quote: Some(TextQuote {
                exact: selected_text.clone(),
                prefix: before_text.clone(),
                suffix: after_text.clone(),
            }),
            selected_text,
            before_text,
            after_text,
        })
    }
}

/// Nearest element at or above `node` inside `root`, skipping highlight wrappers.
fn enclosing_element(doc: &Document, root: NodeId, node: NodeId) -> Option<NodeId> {
    let mut current = doc.nearest_element(node)?;
    while current != root
        && doc
            .element(current)
            .is_some_and(|data| data.has_class(WRAPPER_CLASS))
    {
        current = doc.parent(current)?;
    }
    doc.contains(root, current).then_some(current)
}

/// Offsets of the selection within `element`'s text content.
fn element_offsets(
    doc: &Document,
    element: NodeId,
    range: &TextRange,
    selected_text: &str,
) -> (usize, usize) {
    let index = TextIndex::build(doc, element);
    let length = char_len(selected_text);
    if let Some(start) = index.position_of(range.start) {
        return (start, start + length);
    }
    let element_text = doc.text_content(element);
    element_text.find(selected_text).map_or(
        (range.start.offset, range.start.offset + length),
        |byte| {
            let start = char_len(&element_text[..byte]);
            (start, start + length)
        },
    )
}

/// Page number from the nearest page-indicating ancestor.
fn page_number(doc: &Document, element: NodeId) -> Option<u32> {
    static PAGE_CLASS: OnceLock<Regex> = OnceLock::new();
    let page_class =
        PAGE_CLASS.get_or_init(|| Regex::new(r"^page[-_](\d+)$").expect("Invalid regex"));

    std::iter::once(element)
        .chain(doc.ancestors(element))
        .filter_map(|node| doc.element(node))
        .find_map(|data| {
            data.attr(PAGE_NUMBER_ATTR)
                .and_then(|value| value.trim().parse().ok())
                .or_else(|| {
                    data.classes().find_map(|class| {
                        page_class
                            .captures(class)
                            .and_then(|captures| captures[1].parse().ok())
                    })
                })
        })
}

/// Structural locator for `element` relative to `root`.
///
/// Never fails: when a full locator cannot be produced the bare tag name is
/// used instead.
pub fn locator_for(doc: &Document, root: NodeId, element: NodeId) -> String {
    match try_locator(doc, root, element) {
        Ok(locator) => locator,
        Err(error) => {
            tracing::debug!("Falling back to tag locator: {error}");
            doc.element(element)
                .map_or_else(|| "*".to_string(), |data| data.tag.clone())
        }
    }
}

fn try_locator(doc: &Document, root: NodeId, element: NodeId) -> Result<String> {
    let mut segments = Vec::new();
    let mut current = element;

    loop {
        let data = doc
            .element(current)
            .ok_or_else(|| Error::InvalidInput("locator target is not an element".into()))?;

        if let Some(id) = data.id().filter(|id| selector::is_identifier(id)) {
            segments.push(format!("#{id}"));
            break;
        }

        let mut segment = data.tag.clone();
        if let Some(class) = data
            .classes()
            .find(|class| *class != WRAPPER_CLASS && selector::is_identifier(class))
        {
            segment.push('.');
            segment.push_str(class);
        }

        if current == root {
            segments.push(segment);
            break;
        }

        if selector::same_tag_siblings(doc, current) > 1 {
            let position = selector::nth_of_type(doc, current)
                .ok_or_else(|| Error::InvalidInput("element has no position".into()))?;
            segment.push_str(&format!(":nth-of-type({position})"));
        }
        segments.push(segment);

        let parent = doc
            .parent(current)
            .ok_or_else(|| Error::InvalidInput("element is detached from the root".into()))?;
        if parent == root {
            break;
        }
        current = parent;
    }

    segments.reverse();
    let locator = segments.join(" > ");
    locator.parse::<Selector>()?;
    Ok(locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Boundary;
    use pretty_assertions::assert_eq;

    const PARAGRAPH: &str =
        "Under UK rules the FSCS compensation limit for deposits is £85,000 per person.";

    fn select(doc: &Document, quote: &str, occurrence: usize) -> TextRange {
        let index = TextIndex::build(doc, doc.root());
        let start = index.find_all(quote, 0, index.len())[occurrence];
        index.range(start, start + char_len(quote)).unwrap()
    }

    #[test]
    fn builds_anchor_with_id_locator_and_context() {
        let doc = Document::from_html(&format!(r#"<p id="limits">{PARAGRAPH}</p>"#));
        let range = select(&doc, "FSCS compensation limit", 0);
        let anchor = AnchorBuilder::default().build(&doc, doc.root(), &range).unwrap();

        assert_eq!(anchor.selector, "#limits");
        assert_eq!(anchor.selected_text, "FSCS compensation limit");
        assert_eq!(anchor.before_text, "Under UK rules the ");
        assert_eq!(anchor.after_text, " for deposits is £85,000 per p");
        assert_eq!(anchor.start_offset, 19);
        assert_eq!(anchor.end_offset, 42);
        assert_eq!(anchor.text_quote.unwrap().exact, "FSCS compensation limit");
    }

    #[test]
    fn element_offsets_follow_selected_occurrence() {
        let doc = Document::from_html(r#"<p id="ratios">the ratio and the ratio again</p>"#);
        let anchor = AnchorBuilder::default()
            .build(&doc, doc.root(), &select(&doc, "the ratio", 1))
            .unwrap();
        assert_eq!(anchor.selector, "#ratios");
        assert_eq!((anchor.start_offset, anchor.end_offset), (14, 23));
    }

    #[test]
    fn rejects_short_selections() {
        let doc = Document::from_html(&format!("<p>{PARAGRAPH}</p>"));
        let builder = AnchorBuilder::default();
        for quote in ["U", "UK"] {
            let range = select(&doc, quote, 0);
            assert!(builder.build(&doc, doc.root(), &range).is_none());
        }
    }

    #[test]
    fn rejects_selection_outside_root() {
        let doc = Document::from_html("<p>outside text</p><section><p>inside text</p></section>");
        let section = doc.children(doc.root())[1];
        let range = select(&doc, "outside", 0);
        assert!(AnchorBuilder::default().build(&doc, section, &range).is_none());
    }

    #[test]
    fn uses_common_ancestor_for_cross_element_selection() {
        let doc = Document::from_html(
            r#"<div class="chapter"><p>first part</p><p>second part</p></div>"#,
        );
        let index = TextIndex::build(&doc, doc.root());
        let range = index.range(6, 16).unwrap();
        assert_eq!(range.text(&doc), "partsecond");

        let anchor = AnchorBuilder::default().build(&doc, doc.root(), &range).unwrap();
        assert_eq!(anchor.selector, "div.chapter");
    }

    #[test]
    fn locator_uses_class_and_position() {
        let doc = Document::from_html(
            r#"<section class="notes"><p>one</p><p class="key">two</p><p>three</p></section>"#,
        );
        let section = doc.children(doc.root())[0];
        let third = doc.children(section)[2];
        assert_eq!(
            locator_for(&doc, doc.root(), third),
            "section.notes > p:nth-of-type(3)"
        );
        let second = doc.children(section)[1];
        assert_eq!(
            locator_for(&doc, doc.root(), second),
            "section.notes > p.key:nth-of-type(2)"
        );
    }

    #[test]
    fn locator_skips_unusable_ids() {
        let doc = Document::from_html(r#"<p id="has space" class="2bad">text here</p>"#);
        let p = doc.children(doc.root())[0];
        assert_eq!(locator_for(&doc, doc.root(), p), "p");
    }

    #[test]
    fn reads_page_number_from_ancestors() {
        let doc = Document::from_html(
            r#"<div class="page page-7"><span>alpha beta</span></div><div data-page-number="9"><span>gamma delta</span></div>"#,
        );
        let builder = AnchorBuilder::default();
        let first = builder.build(&doc, doc.root(), &select(&doc, "alpha", 0)).unwrap();
        let second = builder.build(&doc, doc.root(), &select(&doc, "delta", 0)).unwrap();
        assert_eq!(first.page_number, Some(7));
        assert_eq!(second.page_number, Some(9));
    }

    #[test]
    fn collapsed_range_builds_nothing() {
        let doc = Document::from_html("<p>some text</p>");
        let text = doc.text_nodes(doc.root())[0];
        let range = TextRange::new(Boundary::new(text, 2), Boundary::new(text, 2));
        assert!(AnchorBuilder::default().build(&doc, doc.root(), &range).is_none());
    }
}
