//! Flattened text of a subtree with a map back to text nodes.
//!
//! Offsets are char offsets into the concatenation of every text node under
//! the indexed root, so matches can cross text-node boundaries.

use crate::document::{Boundary, Document, NodeId, TextRange};

#[derive(Debug, Clone, Copy)]
struct Segment {
    node: NodeId,
    start: usize,
    len: usize,
}

#[derive(Debug, Clone)]
pub struct TextIndex {
    chars: Vec<char>,
    segments: Vec<Segment>,
}

impl TextIndex {
    pub fn build(doc: &Document, root: NodeId) -> Self {
        let mut chars = Vec::new();
        let mut segments = Vec::new();
        for node in doc.text_nodes(root) {
            let text = doc.text(node).unwrap_or_default();
            let start = chars.len();
            chars.extend(text.chars());
            segments.push(Segment {
                node,
                start,
                len: chars.len() - start,
            });
        }
        Self { chars, segments }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect()
    }

    /// Up to `width` chars ending at `position`.
    pub fn before(&self, position: usize, width: usize) -> String {
        self.slice(position.saturating_sub(width), position)
    }

    /// Up to `width` chars starting at `position`.
    pub fn after(&self, position: usize, width: usize) -> String {
        self.slice(position, position.saturating_add(width))
    }

    /// Global offset of a boundary, if its node is indexed.
    pub fn position_of(&self, boundary: Boundary) -> Option<usize> {
        self.segments
            .iter()
            .find(|segment| segment.node == boundary.node)
            .map(|segment| segment.start + boundary.offset.min(segment.len))
    }

    /// Global `[start, end)` covered by the text under `node`.
    pub fn span_of(&self, doc: &Document, node: NodeId) -> Option<(usize, usize)> {
        let nodes = doc.text_nodes(node);
        let first = *nodes.first()?;
        let last = *nodes.last()?;
        let start = self.position_of(Boundary::new(first, 0))?;
        let end = self.position_of(Boundary::new(last, usize::MAX))?;
        Some((start, end))
    }

    /// Boundary for a range start: prefers the beginning of the following node.
    fn start_boundary(&self, position: usize) -> Option<Boundary> {
        self.segments
            .iter()
            .find(|segment| segment.start <= position && position < segment.start + segment.len)
            .map(|segment| Boundary::new(segment.node, position - segment.start))
    }

    /// Boundary for a range end: prefers the end of the preceding node.
    fn end_boundary(&self, position: usize) -> Option<Boundary> {
        self.segments
            .iter()
            .find(|segment| {
                segment.len > 0 && segment.start < position && position <= segment.start + segment.len
            })
            .map(|segment| Boundary::new(segment.node, position - segment.start))
    }

    /// Live range for the global span `[start, end)`.
    pub fn range(&self, start: usize, end: usize) -> Option<TextRange> {
        if end <= start || end > self.chars.len() {
            return None;
        }
        Some(TextRange::new(
            self.start_boundary(start)?,
            self.end_boundary(end)?,
        ))
    }

    /// Start offsets of `needle` within `[lo, hi)`, in order.
    pub fn find_all(&self, needle: &str, lo: usize, hi: usize) -> Vec<usize> {
        let needle: Vec<char> = needle.chars().collect();
        let hi = hi.min(self.chars.len());
        if needle.is_empty() || hi < lo || hi - lo < needle.len() {
            return Vec::new();
        }
        (lo..=hi - needle.len())
            .filter(|start| self.chars[*start..*start + needle.len()] == needle[..])
            .collect()
    }
}
