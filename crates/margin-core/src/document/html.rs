//! HTML loading and serialization built on `scraper`.

use std::fmt::Write as _;

use scraper::{node::Node as HtmlNode, Html};

use super::{Document, NodeId, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Document {
    /// Parse a sanitized HTML fragment into a document rooted at a `div`.
    ///
    /// Formatting whitespace between elements (whitespace-only text that
    /// contains a line break) is dropped; comments are ignored.
    pub fn from_html(html: &str) -> Self {
        let fragment = Html::parse_fragment(html);
        let mut doc = Self::new("div");
        let mut stack: Vec<_> = fragment
            .root_element()
            .children()
            .rev()
            .map(|child| (doc.root(), child))
            .collect();

        while let Some((parent, node)) = stack.pop() {
            match node.value() {
                HtmlNode::Element(element) => {
                    let id = doc.create_element(element.name());
                    if let Some(data) = doc.element_mut(id) {
                        for (name, value) in element.attrs() {
                            data.set_attr(name, value);
                        }
                    }
                    doc.append_child(parent, id);
                    stack.extend(node.children().rev().map(|child| (id, child)));
                }
                HtmlNode::Text(text) => {
                    let value: &str = text;
                    if value.trim().is_empty() && value.contains('\n') {
                        continue;
                    }
                    let id = doc.create_text(value);
                    doc.append_child(parent, id);
                }
                _ => {}
            }
        }
        doc
    }

    /// Serialize the children of `node` as HTML.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    /// Serialize `node` itself as HTML.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element(data) => {
                out.push('<');
                out.push_str(&data.tag);
                for (name, value) in &data.attributes {
                    let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&data.tag.as_str()) {
                    return;
                }
                for child in self.children(node) {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{}>", data.tag);
            }
        }
    }
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
