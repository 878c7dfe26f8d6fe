//! Document tree that anchors are built from and resolved against.
//!
//! The tree is a node arena with parent links: elements carry a tag and
//! attributes, text leaves carry the content. Rendered HTML and PDF text
//! layers are both loaded into this shape so the builder, resolver and
//! renderers never touch a real rendering engine.

mod html;
mod range;
pub(crate) mod selector;
mod text_layer;

pub use range::{Boundary, TextRange};
pub use selector::Selector;
pub use text_layer::{TextLayerPage, TextRun};

use crate::error::Result;

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Tag and attributes of an element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|candidate| candidate == class)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree.
///
/// Removed nodes stay in the arena, detached; ids are never reused.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a document whose root is an empty `root_tag` element.
    pub fn new(root_tag: &str) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Element(ElementData::new(root_tag)),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Text(_))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Ancestors of `node`, nearest first, excluding `node` itself.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |current| self.parent(*current))
    }

    /// Whether `node` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|candidate| candidate == ancestor)
    }

    /// Nearest element at or above `node`.
    pub fn nearest_element(&self, node: NodeId) -> Option<NodeId> {
        if self.element(node).is_some() {
            return Some(node);
        }
        self.ancestors(node)
            .find(|candidate| self.element(*candidate).is_some())
    }

    /// Deepest node containing both `a` and `b`.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        std::iter::once(a)
            .chain(self.ancestors(a))
            .find(|candidate| self.contains(*candidate, b))
    }

    /// `node` and everything below it, in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Text leaves under `node`, in document order.
    pub fn text_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|candidate| self.is_text(*candidate))
            .collect()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.text_nodes(node)
            .into_iter()
            .filter_map(|text| self.text(text))
            .collect()
    }

    /// Elements under `root` (inclusive) matching a structural selector.
    pub fn query_selector_all(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let selector: Selector = selector.parse()?;
        Ok(self
            .descendants(root)
            .into_iter()
            .filter(|node| selector.matches(self, *node))
            .collect())
    }

    /// Elements under `root` (inclusive) carrying `class`.
    pub fn elements_with_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|node| self.element(*node).is_some_and(|data| data.has_class(class)))
            .collect()
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` into `parent` right before `reference`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|candidate| *candidate == reference)
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(position, child);
    }

    /// Put `replacement` where `node` was and detach `node`.
    pub fn replace_with(&mut self, node: NodeId, replacement: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.insert_before(parent, replacement, node);
        self.detach(node);
    }

    /// Split a text node at a char offset, like DOM `splitText`.
    ///
    /// `node` keeps the head; the returned node holds the tail and follows it.
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> NodeId {
        let text = self.text(node).unwrap_or_default().to_string();
        let split_at = text
            .char_indices()
            .nth(offset)
            .map_or(text.len(), |(byte, _)| byte);
        let (head, tail) = text.split_at(split_at);
        let tail = tail.to_string();
        self.nodes[node.0].kind = NodeKind::Text(head.to_string());

        let tail_node = self.create_text(tail);
        if let Some(parent) = self.parent(node) {
            let position = self.nodes[parent.0]
                .children
                .iter()
                .position(|candidate| *candidate == node)
                .map_or(self.nodes[parent.0].children.len(), |index| index + 1);
            self.nodes[tail_node.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(position, tail_node);
        }
        tail_node
    }

    /// Merge adjacent text children and drop empty ones, recursively.
    pub fn normalize(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            let Some(text) = self.text(child).map(str::to_string) else {
                self.normalize(child);
                kept.push(child);
                continue;
            };
            if text.is_empty() {
                self.nodes[child.0].parent = None;
                continue;
            }
            match kept.last().copied() {
                Some(previous) if self.is_text(previous) => {
                    if let NodeKind::Text(existing) = &mut self.nodes[previous.0].kind {
                        existing.push_str(&text);
                    }
                    self.nodes[child.0].parent = None;
                }
                _ => kept.push(child),
            }
        }
        self.nodes[node.0].children = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paragraph() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("div");
        let p = doc.create_element("p");
        let text = doc.create_text("hello brave world");
        doc.append_child(doc.root(), p);
        doc.append_child(p, text);
        (doc, p, text)
    }

    #[test]
    fn text_content_concatenates_leaves() {
        let (mut doc, p, _) = paragraph();
        let bold = doc.create_element("b");
        let extra = doc.create_text("!");
        doc.append_child(p, bold);
        doc.append_child(bold, extra);
        assert_eq!(doc.text_content(doc.root()), "hello brave world!");
    }

    #[test]
    fn split_text_inserts_tail_after_head() {
        let (mut doc, p, text) = paragraph();
        let tail = doc.split_text(text, 6);
        assert_eq!(doc.text(text), Some("hello "));
        assert_eq!(doc.text(tail), Some("brave world"));
        assert_eq!(doc.children(p), &[text, tail]);
    }

    #[test]
    fn normalize_merges_adjacent_text() {
        let (mut doc, p, text) = paragraph();
        let tail = doc.split_text(text, 6);
        let _empty = doc.split_text(tail, 11);
        doc.normalize(p);
        assert_eq!(doc.children(p).len(), 1);
        assert_eq!(doc.text_content(p), "hello brave world");
    }

    #[test]
    fn common_ancestor_finds_shared_parent() {
        let (mut doc, p, text) = paragraph();
        let other = doc.create_element("p");
        let other_text = doc.create_text("second");
        doc.append_child(doc.root(), other);
        doc.append_child(other, other_text);
        assert_eq!(doc.common_ancestor(text, text), Some(text));
        assert_eq!(doc.common_ancestor(text, other_text), Some(doc.root()));
        assert!(doc.contains(p, text));
        assert!(!doc.contains(other, text));
    }

    #[test]
    fn replace_with_keeps_position() {
        let (mut doc, p, text) = paragraph();
        let span = doc.create_element("span");
        doc.replace_with(text, span);
        assert_eq!(doc.children(p), &[span]);
        assert_eq!(doc.parent(text), None);
    }

    #[test]
    fn query_selector_all_reports_malformed_selectors() {
        let (doc, p, _) = paragraph();
        assert_eq!(doc.query_selector_all(doc.root(), "p").unwrap(), vec![p]);
        assert!(doc.query_selector_all(doc.root(), "p[").is_err());
    }
}
