//! PDF-style text layers.
//!
//! A text layer is the read-only, positioned text that sits over a
//! rasterized page. Each page becomes a `div.page[data-page-number]` and each
//! positioned run a `span` carrying its box in `data-x`/`data-y`/
//! `data-width`/`data-height`. Pages are stacked vertically, so span boxes are
//! in layer coordinates rather than page coordinates.

use serde::{Deserialize, Serialize};

use super::Document;

/// Positioned run of text on a page (page coordinates, origin top-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One page of a text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayerPage {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

pub(crate) fn set_box(doc: &mut Document, node: super::NodeId, x: f32, y: f32, width: f32, height: f32) {
    if let Some(data) = doc.element_mut(node) {
        data.set_attr("data-x", x.to_string());
        data.set_attr("data-y", y.to_string());
        data.set_attr("data-width", width.to_string());
        data.set_attr("data-height", height.to_string());
    }
}

impl Document {
    /// Build a text-layer document from positioned runs.
    pub fn from_text_layer(pages: &[TextLayerPage]) -> Self {
        let mut doc = Self::new("div");
        let root = doc.root();
        if let Some(data) = doc.element_mut(root) {
            data.set_attr("class", "text-layer");
        }

        let mut top = 0.0_f32;
        let mut layer_width = 0.0_f32;
        for page in pages {
            let page_node = doc.create_element("div");
            if let Some(data) = doc.element_mut(page_node) {
                data.set_attr("class", format!("page page-{}", page.page_number));
                data.set_attr("data-page-number", page.page_number.to_string());
            }
            set_box(&mut doc, page_node, 0.0, top, page.width, page.height);
            doc.append_child(root, page_node);

            for run in &page.runs {
                let span = doc.create_element("span");
                set_box(&mut doc, span, run.x, top + run.y, run.width, run.height);
                let text = doc.create_text(run.text.clone());
                doc.append_child(page_node, span);
                doc.append_child(span, text);
            }

            top += page.height;
            layer_width = layer_width.max(page.width);
        }
        set_box(&mut doc, root, 0.0, 0.0, layer_width, top);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, y: f32) -> TextRun {
        TextRun {
            text: text.to_string(),
            x,
            y,
            width: 10.0 * text.chars().count() as f32,
            height: 12.0,
        }
    }

    #[test]
    fn stacks_pages_and_marks_page_numbers() {
        let pages = vec![
            TextLayerPage {
                page_number: 1,
                width: 600.0,
                height: 800.0,
                runs: vec![run("First page ", 10.0, 20.0)],
            },
            TextLayerPage {
                page_number: 2,
                width: 600.0,
                height: 800.0,
                runs: vec![run("Second page", 10.0, 20.0)],
            },
        ];
        let doc = Document::from_text_layer(&pages);
        let page_two = doc.query_selector_all(doc.root(), r#"[data-page-number="2"]"#).unwrap();
        assert_eq!(page_two.len(), 1);

        let span = doc.children(page_two[0])[0];
        assert_eq!(doc.element(span).unwrap().attr("data-y"), Some("820"));
        assert_eq!(doc.text_content(doc.root()), "First page Second page");
    }
}
