//! Relocates anchors in a freshly rendered document.

use std::collections::HashSet;

use super::text_index::TextIndex;
use crate::document::{Document, NodeId, TextRange};
use crate::models::{Anchor, CONTEXT_CHARS};
use crate::util::{char_len, collapse_whitespace};

/// How a resolution was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Found inside an element matched by the anchor's selector
    Structural,
    /// Found by searching the whole container; the selector is stale
    Contextual,
}

/// A live range recovered for an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub range: TextRange,
    pub kind: MatchKind,
}

impl Resolution {
    pub const fn needs_heal(&self) -> bool {
        matches!(self.kind, MatchKind::Contextual)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnchorResolver {
    context_chars: usize,
}

impl Default for AnchorResolver {
    fn default() -> Self {
        Self::new(CONTEXT_CHARS)
    }
}

impl AnchorResolver {
    pub const fn new(context_chars: usize) -> Self {
        Self { context_chars }
    }

    /// Best live range for `anchor` under `root`, or `None` when the text is gone.
    pub fn resolve(&self, doc: &Document, root: NodeId, anchor: &Anchor) -> Option<Resolution> {
        self.candidates(doc, root, anchor).into_iter().next()
    }

    /// Every acceptable occurrence of the anchor's text, best first.
    ///
    /// Context-verified occurrences inside selector matches come first,
    /// followed by verified ones in the rest of the container (the anchor's
    /// page first, when it has one). Occurrences whose context drifted come
    /// last, ranked by how much of the captured context still lines up; they
    /// are always [`MatchKind::Contextual`] so the anchor gets rebuilt.
    pub fn candidates(&self, doc: &Document, root: NodeId, anchor: &Anchor) -> Vec<Resolution> {
        if anchor.selected_text.is_empty() {
            return Vec::new();
        }

        let index = TextIndex::build(doc, root);
        let mut scopes = Vec::new();

        match doc.query_selector_all(root, &anchor.selector) {
            Ok(elements) => {
                scopes.extend(
                    elements
                        .into_iter()
                        .filter_map(|element| index.span_of(doc, element))
                        .map(|span| (span, MatchKind::Structural)),
                );
            }
            Err(error) => {
                tracing::debug!("Skipping structural match: {error}");
            }
        }

        if let Some(page) = anchor.page_number {
            let page_selector = format!(r#"[data-page-number="{page}"]"#);
            if let Ok(pages) = doc.query_selector_all(root, &page_selector) {
                scopes.extend(
                    pages
                        .into_iter()
                        .filter_map(|node| index.span_of(doc, node))
                        .map(|span| (span, MatchKind::Contextual)),
                );
            }
        }
        scopes.push(((0, index.len()), MatchKind::Contextual));

        let length = char_len(&anchor.selected_text);
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut drifted = Vec::new();

        for ((lo, hi), kind) in scopes {
            for start in index.find_all(&anchor.selected_text, lo, hi) {
                if !seen.insert(start) {
                    continue;
                }
                let Some(range) = index.range(start, start + length) else {
                    continue;
                };
                match self.context_overlap(&index, anchor, start, start + length) {
                    ContextFit::Exact => found.push(Resolution { range, kind }),
                    ContextFit::Partial(score) => drifted.push((score, range)),
                }
            }
        }

        // A lone occurrence is kept even when none of its context survived
        let lone = seen.len() == 1;
        drifted.retain(|(score, _)| *score > 0 || lone);
        drifted.sort_by(|a, b| b.0.cmp(&a.0));
        if !drifted.is_empty() {
            tracing::debug!(
                "{} occurrence(s) of {:?} matched with drifted context",
                drifted.len(),
                anchor.selected_text
            );
        }
        found.extend(drifted.into_iter().map(|(_, range)| Resolution {
            range,
            kind: MatchKind::Contextual,
        }));
        found
    }

    /// Compare the text around an occurrence with the anchor's quote.
    ///
    /// Whitespace is collapsed on both sides and the live window is twice the
    /// captured width, so re-flowed whitespace does not reject a match.
    /// A partial fit scores the chars of prefix and suffix that still line up.
    fn context_overlap(
        &self,
        index: &TextIndex,
        anchor: &Anchor,
        start: usize,
        end: usize,
    ) -> ContextFit {
        let Some(quote) = &anchor.text_quote else {
            return ContextFit::Exact;
        };
        let window = self.context_chars * 2;
        let before = collapse_whitespace(&index.before(start, window));
        let after = collapse_whitespace(&index.after(end, window));
        let prefix = collapse_whitespace(&quote.prefix);
        let suffix = collapse_whitespace(&quote.suffix);

        if before.ends_with(&prefix) && after.starts_with(&suffix) {
            return ContextFit::Exact;
        }
        let leading = before
            .chars()
            .rev()
            .zip(prefix.chars().rev())
            .take_while(|(live, kept)| live == kept)
            .count();
        let trailing = after
            .chars()
            .zip(suffix.chars())
            .take_while(|(live, kept)| live == kept)
            .count();
        ContextFit::Partial(leading + trailing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextFit {
    Exact,
    Partial(usize),
}
