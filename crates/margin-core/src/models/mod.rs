//! Data models for Margin

mod anchor;
mod highlight;
mod versions;

pub use anchor::{Anchor, TextQuote, CONTEXT_CHARS, MIN_SELECTION_CHARS};
pub use highlight::{Highlight, HighlightColor, HighlightId, HighlightNote, MergeSide};
pub use versions::VersionVector;
