//! Wrap strategy: surround resolved ranges with `mark` elements.

use super::{
    wrap_fill, ClickDisposition, HighlightController, HIGHLIGHT_ID_ATTR, WRAPPER_CLASS,
    WRAPPER_TAG,
};
use crate::document::{Document, NodeId, TextRange};
use crate::models::{HighlightColor, HighlightId};
use crate::util::char_len;

#[derive(Debug, Clone, Copy, Default)]
pub struct WrapRenderer;

impl WrapRenderer {
    /// Remove every wrapper under `root`, keeping its contents in place.
    ///
    /// Must run before a pass inserts new wrappers, or stale marks would
    /// nest inside fresh ones. Returns the number of wrappers removed.
    pub fn clear(&self, doc: &mut Document, root: NodeId) -> usize {
        let wrappers: Vec<NodeId> = doc
            .elements_with_class(root, WRAPPER_CLASS)
            .into_iter()
            .filter(|node| *node != root)
            .collect();

        for wrapper in &wrappers {
            let Some(parent) = doc.parent(*wrapper) else {
                continue;
            };
            for child in doc.children(*wrapper).to_vec() {
                doc.insert_before(parent, child, *wrapper);
            }
            doc.detach(*wrapper);
        }

        if !wrappers.is_empty() {
            doc.normalize(root);
            tracing::debug!("Removed {} highlight wrappers", wrappers.len());
        }
        wrappers.len()
    }

    /// Wrap `range` in a single highlight element.
    ///
    /// Fails when the boundaries sit under different parents, since a single
    /// element could not contain the range without splitting an element.
    pub fn surround(
        &self,
        doc: &mut Document,
        range: &TextRange,
        highlight_id: &HighlightId,
        color: HighlightColor,
    ) -> Option<NodeId> {
        if range.is_collapsed() {
            return None;
        }
        let parent = doc.parent(range.start.node)?;
        if doc.parent(range.end.node) != Some(parent)
            || !doc.is_text(range.start.node)
            || !doc.is_text(range.end.node)
        {
            return None;
        }

        let end_len = doc.text(range.end.node).map_or(0, char_len);
        if range.end.offset < end_len {
            doc.split_text(range.end.node, range.end.offset);
        }
        let (first, last) = if range.start.node == range.end.node {
            if range.start.offset > 0 {
                let middle = doc.split_text(range.start.node, range.start.offset);
                (middle, middle)
            } else {
                (range.start.node, range.start.node)
            }
        } else if range.start.offset > 0 {
            (
                doc.split_text(range.start.node, range.start.offset),
                range.end.node,
            )
        } else {
            (range.start.node, range.end.node)
        };

        let siblings = doc.children(parent);
        let from = siblings.iter().position(|node| *node == first)?;
        let to = siblings.iter().position(|node| *node == last)?;
        if to < from {
            return None;
        }
        let moved = siblings[from..=to].to_vec();

        let mark = doc.create_element(WRAPPER_TAG);
        if let Some(data) = doc.element_mut(mark) {
            data.set_attr("class", WRAPPER_CLASS);
            data.set_attr(HIGHLIGHT_ID_ATTR, highlight_id.as_str());
            data.set_attr("style", format!("background-color: {};", wrap_fill(color)));
        }
        doc.insert_before(parent, mark, first);
        for node in moved {
            doc.append_child(mark, node);
        }
        Some(mark)
    }

    /// Highlight id of the wrapper containing `node`, if any.
    pub fn hit(&self, doc: &Document, node: NodeId) -> Option<HighlightId> {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .filter_map(|candidate| doc.element(candidate))
            .find(|data| data.has_class(WRAPPER_CLASS))
            .and_then(|data| data.attr(HIGHLIGHT_ID_ATTR))
            .map(HighlightId::from)
    }

    /// Route a click on `node` to `controller` when it lands on a highlight.
    pub fn dispatch_click(
        &self,
        doc: &Document,
        node: NodeId,
        controller: &mut dyn HighlightController,
    ) -> ClickDisposition {
        match self.hit(doc, node) {
            Some(id) => {
                controller.on_highlight_click(&id);
                ClickDisposition::Handled
            }
            None => ClickDisposition::Propagate,
        }
    }
}
