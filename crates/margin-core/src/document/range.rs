//! Text ranges over the document tree

use super::{Document, NodeId};
use crate::util::{char_len, char_slice};

/// A position inside a text node, as a char offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub const fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A live selection between two text-node boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub const fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Deepest node containing both boundaries.
    pub fn common_ancestor(&self, doc: &Document) -> Option<NodeId> {
        doc.common_ancestor(self.start.node, self.end.node)
    }

    /// Text nodes touched by the range, in document order.
    pub fn text_nodes(&self, doc: &Document) -> Vec<NodeId> {
        let Some(ancestor) = self.common_ancestor(doc) else {
            return Vec::new();
        };
        let nodes = doc.text_nodes(ancestor);
        let Some(first) = nodes.iter().position(|node| *node == self.start.node) else {
            return Vec::new();
        };
        let Some(last) = nodes.iter().position(|node| *node == self.end.node) else {
            return Vec::new();
        };
        if last < first {
            return Vec::new();
        }
        nodes[first..=last].to_vec()
    }

    /// Char span `[start, end)` the range covers inside `node`.
    pub fn span_in(&self, doc: &Document, node: NodeId) -> (usize, usize) {
        let len = doc.text(node).map_or(0, char_len);
        let start = if node == self.start.node {
            self.start.offset.min(len)
        } else {
            0
        };
        let end = if node == self.end.node {
            self.end.offset.min(len)
        } else {
            len
        };
        (start, end.max(start))
    }

    /// String content of the range.
    pub fn text(&self, doc: &Document) -> String {
        self.text_nodes(doc)
            .into_iter()
            .map(|node| {
                let (start, end) = self.span_in(doc, node);
                char_slice(doc.text(node).unwrap_or_default(), start, end)
            })
            .collect()
    }
}
