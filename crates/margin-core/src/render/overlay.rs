//! Overlay strategy: translucent boxes positioned over the text.
//!
//! The document is never modified. Boxes are recomputed from the layout on
//! every pass, so a zoom or resize only needs another [`OverlayRenderer::relayout`].

use super::{
    overlay_fill, ClickDisposition, HighlightController, TextLayout, HIGHLIGHT_ID_ATTR,
    OVERLAY_OPACITY,
};
use crate::document::{Document, NodeId, TextRange};
use crate::models::{HighlightColor, HighlightId};
use crate::render::Rect;

const LAYER_CLASS: &str = "highlight-overlay-layer";
const BOX_CLASS: &str = "highlight-overlay";

/// One painted rectangle of a highlight, relative to the container.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub highlight_id: HighlightId,
    pub rect: Rect,
    pub color: HighlightColor,
}

impl OverlayBox {
    pub const fn fill(&self) -> &'static str {
        overlay_fill(self.color)
    }
}

/// Boxes painted over one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayLayer {
    boxes: Vec<OverlayBox>,
}

impl OverlayLayer {
    pub fn boxes(&self) -> &[OverlayBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub(crate) fn extend(&mut self, boxes: impl IntoIterator<Item = OverlayBox>) {
        self.boxes.extend(boxes);
    }

    /// Topmost highlight under a container-relative point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<&HighlightId> {
        self.boxes
            .iter()
            .rev()
            .find(|overlay| overlay.rect.contains(x, y))
            .map(|overlay| &overlay.highlight_id)
    }

    pub fn dispatch_click(
        &self,
        x: f32,
        y: f32,
        controller: &mut dyn HighlightController,
    ) -> ClickDisposition {
        match self.hit_test(x, y) {
            Some(id) => {
                controller.on_highlight_click(id);
                ClickDisposition::Handled
            }
            None => ClickDisposition::Propagate,
        }
    }

    /// Absolutely positioned markup for the layer.
    ///
    /// The layer itself ignores pointer events so text selection underneath
    /// keeps working; only the boxes receive clicks.
    pub fn to_html(&self) -> String {
        let mut doc = Document::new("div");
        let root = doc.root();
        if let Some(data) = doc.element_mut(root) {
            data.set_attr("class", LAYER_CLASS);
            data.set_attr(
                "style",
                "position: absolute; inset: 0; pointer-events: none;",
            );
        }
        for overlay in &self.boxes {
            let node = doc.create_element("div");
            if let Some(data) = doc.element_mut(node) {
                data.set_attr("class", BOX_CLASS);
                data.set_attr(HIGHLIGHT_ID_ATTR, overlay.highlight_id.as_str());
                data.set_attr(
                    "style",
                    format!(
                        "position: absolute; left: {}px; top: {}px; width: {}px; height: {}px; \
                         background-color: {}; opacity: {OVERLAY_OPACITY}; pointer-events: auto; cursor: pointer;",
                        overlay.rect.x,
                        overlay.rect.y,
                        overlay.rect.width,
                        overlay.rect.height,
                        overlay.fill()
                    ),
                );
            }
            doc.append_child(root, node);
        }
        doc.outer_html(root)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer<L: TextLayout> {
    layout: L,
}

impl<L: TextLayout> OverlayRenderer<L> {
    pub const fn new(layout: L) -> Self {
        Self { layout }
    }

    pub const fn layout(&self) -> &L {
        &self.layout
    }

    /// Boxes for one range, positioned relative to `container`.
    pub fn boxes_for(
        &self,
        doc: &Document,
        container: NodeId,
        range: &TextRange,
        highlight_id: &HighlightId,
        color: HighlightColor,
    ) -> Vec<OverlayBox> {
        let origin = self
            .layout
            .bounding_box(doc, container)
            .unwrap_or_default();
        self.layout
            .client_rects(doc, range)
            .into_iter()
            .filter(|rect| rect.width > 0.0 && rect.height > 0.0)
            .map(|rect| OverlayBox {
                highlight_id: highlight_id.clone(),
                rect: rect.relative_to(&origin),
                color,
            })
            .collect()
    }

    /// Recompute every box from already resolved ranges.
    pub fn relayout(
        &self,
        doc: &Document,
        container: NodeId,
        placements: &[(HighlightId, HighlightColor, TextRange)],
    ) -> OverlayLayer {
        let mut layer = OverlayLayer::default();
        for (id, color, range) in placements {
            layer.extend(self.boxes_for(doc, container, range, id, *color));
        }
        layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::TextIndex;
    use crate::document::{TextLayerPage, TextRun};
    use crate::render::SpanBoxLayout;
    use crate::util::char_len;
    use pretty_assertions::assert_eq;

    fn two_pages() -> Document {
        let page = |number: u32, text: &str| TextLayerPage {
            page_number: number,
            width: 400.0,
            height: 500.0,
            runs: vec![TextRun {
                text: text.to_string(),
                x: 20.0,
                y: 40.0,
                width: 10.0 * char_len(text) as f32,
                height: 14.0,
            }],
        };
        Document::from_text_layer(&[page(1, "Capital adequacy ratio"), page(2, "Liquidity coverage ratio")])
    }

    fn range_of(doc: &Document, quote: &str) -> TextRange {
        let index = TextIndex::build(doc, doc.root());
        let start = index.find_all(quote, 0, index.len())[0];
        index.range(start, start + char_len(quote)).unwrap()
    }

    #[test]
    fn boxes_are_relative_to_container() {
        let doc = two_pages();
        let page_two = doc
            .query_selector_all(doc.root(), r#"[data-page-number="2"]"#)
            .unwrap()[0];
        let renderer = OverlayRenderer::new(SpanBoxLayout);
        let id = HighlightId::from("hl_lcr");

        let boxes = renderer.boxes_for(
            &doc,
            page_two,
            &range_of(&doc, "coverage"),
            &id,
            HighlightColor::Green,
        );
        assert_eq!(
            boxes,
            vec![OverlayBox {
                highlight_id: id,
                rect: Rect::new(120.0, 40.0, 80.0, 14.0),
                color: HighlightColor::Green,
            }]
        );
        assert_eq!(boxes[0].fill(), "#bbf7d0");
    }

    #[test]
    fn hit_test_prefers_topmost_box() {
        let doc = two_pages();
        let renderer = OverlayRenderer::new(SpanBoxLayout);
        let placements = vec![
            (HighlightId::from("hl_wide"), HighlightColor::Yellow, range_of(&doc, "Capital adequacy")),
            (HighlightId::from("hl_narrow"), HighlightColor::Red, range_of(&doc, "adequacy")),
        ];
        let layer = renderer.relayout(&doc, doc.root(), &placements);
        assert_eq!(layer.len(), 2);

        assert_eq!(layer.hit_test(25.0, 45.0), Some(&HighlightId::from("hl_wide")));
        assert_eq!(layer.hit_test(110.0, 45.0), Some(&HighlightId::from("hl_narrow")));
        assert_eq!(layer.hit_test(390.0, 300.0), None);
    }

    #[test]
    fn html_marks_boxes_clickable_and_layer_transparent() {
        let doc = two_pages();
        let renderer = OverlayRenderer::new(SpanBoxLayout);
        let layer = renderer.relayout(
            &doc,
            doc.root(),
            &[(HighlightId::from("hl_1"), HighlightColor::Yellow, range_of(&doc, "ratio"))],
        );
        let html = layer.to_html();
        assert!(html.starts_with(r#"<div class="highlight-overlay-layer""#));
        assert!(html.contains(r#"data-highlight-id="hl_1""#));
        assert!(html.contains("background-color: #fef08a; opacity: 0.4; pointer-events: auto"));
    }

    #[test]
    fn click_outside_boxes_propagates() {
        struct Ignore;
        impl HighlightController for Ignore {
            fn on_highlight_click(&mut self, _: &HighlightId) {}
        }
        assert_eq!(
            OverlayLayer::default().dispatch_click(1.0, 1.0, &mut Ignore),
            ClickDisposition::Propagate
        );
    }
}
