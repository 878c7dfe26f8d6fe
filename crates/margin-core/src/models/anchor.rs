//! Anchor model
//!
//! An anchor points at a piece of selected text without holding on to any
//! live document node, so it survives re-renders of the document.

use serde::{Deserialize, Serialize};

/// Characters of surrounding context captured on each side of a selection.
pub const CONTEXT_CHARS: usize = 30;

/// Minimum trimmed selection length accepted when building an anchor.
pub const MIN_SELECTION_CHARS: usize = 3;

/// Exact quote plus its surrounding context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextQuote {
    pub exact: String,
    pub prefix: String,
    pub suffix: String,
}

/// A relocatable pointer into a document's text content.
///
/// `selector` and the offsets describe where the text was at creation time and
/// may go stale; `selected_text` is the ground truth used for relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    /// Structural locator of the nearest enclosing element
    pub selector: String,
    /// Start offset (chars) within the located element's text
    pub start_offset: usize,
    /// End offset (chars) within the located element's text
    pub end_offset: usize,
    /// Exact selected text
    pub selected_text: String,
    /// Context immediately preceding the selection
    pub before_text: String,
    /// Context immediately following the selection
    pub after_text: String,
    /// Page the selection was made on, for paginated documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Structured duplicate of the quote/context triple
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_quote: Option<TextQuote>,
}

impl Anchor {
    /// Whether the selected text meets the minimum length requirement.
    pub fn has_usable_text(&self) -> bool {
        self.selected_text.trim().chars().count() >= MIN_SELECTION_CHARS
    }

    /// Returns a copy pointing at a new structural location, keeping the quote.
    #[must_use]
    pub fn relocated(&self, selector: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            selector,
            start_offset,
            end_offset,
            ..self.clone()
        }
    }
}
