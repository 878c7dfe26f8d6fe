//! Highlight painting.
//!
//! Two strategies are supported:
//! - wrap: resolved ranges are surrounded with `mark` elements in the document
//!   itself, for reflowable HTML
//! - overlay: translucent boxes are positioned over the text, for text layers
//!   whose nodes must not be restructured
//!
//! [`RenderSession`] drives either strategy over a material's highlights.

mod layout;
mod overlay;
mod session;
mod wrap;

pub use layout::{Rect, SpanBoxLayout, TextLayout};
pub use overlay::{OverlayBox, OverlayLayer, OverlayRenderer};
pub use session::{RenderReport, RenderSession};
pub use wrap::WrapRenderer;

use std::fmt;
use std::str::FromStr;

use crate::models::{HighlightColor, HighlightId};

pub const WRAPPER_TAG: &str = "mark";
pub const WRAPPER_CLASS: &str = "margin-highlight";
pub const HIGHLIGHT_ID_ATTR: &str = "data-highlight-id";
pub const OVERLAY_OPACITY: f32 = 0.4;

/// Overlay fill for a highlight color.
pub const fn overlay_fill(color: HighlightColor) -> &'static str {
    match color {
        HighlightColor::Yellow => "#fef08a",
        HighlightColor::Green => "#bbf7d0",
        HighlightColor::Red => "#fecaca",
        HighlightColor::Blue => "#bfdbfe",
    }
}

/// Background of a wrapped highlight.
pub const fn wrap_fill(color: HighlightColor) -> &'static str {
    match color {
        HighlightColor::Yellow => "#fef3c7",
        HighlightColor::Green => "#d1fae5",
        HighlightColor::Red => "#fee2e2",
        HighlightColor::Blue => "#dbeafe",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderStrategy {
    #[default]
    Wrap,
    Overlay,
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wrap => "wrap",
            Self::Overlay => "overlay",
        })
    }
}

impl FromStr for RenderStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap" => Ok(Self::Wrap),
            "overlay" => Ok(Self::Overlay),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown render strategy '{other}'"
            ))),
        }
    }
}

/// Receives clicks on painted highlights.
pub trait HighlightController {
    fn on_highlight_click(&mut self, highlight_id: &HighlightId);
}

/// Whether a click was consumed by a highlight.
///
/// `Handled` means the event must not propagate further, so the
/// new-selection popup does not open on top of the note editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDisposition {
    Handled,
    Propagate,
}
