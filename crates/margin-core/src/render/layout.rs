//! Geometry of laid-out text.

use serde::{Deserialize, Serialize};

use crate::document::{Document, ElementData, NodeId, TextRange};
use crate::util::char_len;

/// Rows closer than this are treated as one visual line.
const LINE_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// This rect expressed relative to `origin`'s top-left corner.
    #[must_use]
    pub fn relative_to(&self, origin: &Self) -> Self {
        Self::new(self.x - origin.x, self.y - origin.y, self.width, self.height)
    }

    fn same_line(&self, other: &Self) -> bool {
        (self.y - other.y).abs() <= LINE_TOLERANCE
            && (self.height - other.height).abs() <= LINE_TOLERANCE
    }

    #[must_use]
    fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

/// Source of on-screen geometry for document nodes.
pub trait TextLayout {
    /// One rect per visual line fragment the range covers, in layer coordinates.
    fn client_rects(&self, doc: &Document, range: &TextRange) -> Vec<Rect>;

    fn bounding_box(&self, doc: &Document, node: NodeId) -> Option<Rect>;
}

/// Layout read from the boxes a text layer stores on its spans.
///
/// Each span's width is split evenly across its characters, which matches
/// how text layers stretch runs to the width measured on the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanBoxLayout;

impl SpanBoxLayout {
    fn read_box(data: &ElementData) -> Option<Rect> {
        let read = |name: &str| data.attr(name)?.trim().parse::<f32>().ok();
        Some(Rect::new(
            read("data-x")?,
            read("data-y")?,
            read("data-width")?,
            read("data-height")?,
        ))
    }

    /// Box of the nearest positioned element at or above `node`.
    fn positioned_box(doc: &Document, node: NodeId) -> Option<Rect> {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .filter_map(|candidate| doc.element(candidate))
            .find_map(Self::read_box)
    }
}

impl TextLayout for SpanBoxLayout {
    fn client_rects(&self, doc: &Document, range: &TextRange) -> Vec<Rect> {
        let mut rects: Vec<Rect> = Vec::new();

        for node in range.text_nodes(doc) {
            let (start, end) = range.span_in(doc, node);
            let len = doc.text(node).map_or(0, char_len);
            if start >= end || len == 0 {
                continue;
            }
            let Some(span) = Self::positioned_box(doc, node) else {
                tracing::debug!("Text node without a layout box; skipping");
                continue;
            };

            let advance = span.width / len as f32;
            let rect = Rect::new(
                span.x + advance * start as f32,
                span.y,
                advance * (end - start) as f32,
                span.height,
            );

            match rects.last_mut() {
                Some(previous)
                    if previous.same_line(&rect) && rect.x - previous.right() <= 1.0 =>
                {
                    *previous = previous.union(&rect);
                }
                _ => rects.push(rect),
            }
        }

        rects
    }

    fn bounding_box(&self, doc: &Document, node: NodeId) -> Option<Rect> {
        doc.element(node).and_then(Self::read_box)
    }
}
