//! Render pass orchestration.
//!
//! A pass tears down the previous artifacts, then resolves and paints each
//! highlight in store order. Contextual matches queue a heal; the pass never
//! waits for persistence.

use super::{OverlayLayer, OverlayRenderer, TextLayout, WrapRenderer};
use crate::anchor::{
    AnchorBuilder, AnchorResolver, HealRequest, HealSender, HealTracker, MaterialEpoch, Resolution,
};
use crate::config::MarginConfig;
use crate::document::{Document, NodeId};
use crate::models::{Anchor, Highlight, HighlightId};

/// What a render pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub generation: u64,
    pub rendered: Vec<HighlightId>,
    pub unrenderable: Vec<HighlightId>,
    pub healed: Vec<HighlightId>,
}

pub struct RenderSession {
    builder: AnchorBuilder,
    resolver: AnchorResolver,
    tracker: HealTracker,
    epoch: MaterialEpoch,
    generation: u64,
    heal_queue: Option<HealSender>,
    wrap: WrapRenderer,
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new(AnchorBuilder::default(), AnchorResolver::default())
    }
}

impl RenderSession {
    pub fn new(builder: AnchorBuilder, resolver: AnchorResolver) -> Self {
        Self {
            builder,
            resolver,
            tracker: HealTracker::default(),
            epoch: MaterialEpoch::default(),
            generation: 0,
            heal_queue: None,
            wrap: WrapRenderer,
        }
    }

    pub fn from_config(config: &MarginConfig) -> Self {
        Self::new(
            AnchorBuilder::new(config.context_chars, config.min_selection_chars),
            AnchorResolver::new(config.context_chars),
        )
    }

    /// Send heals for contextual matches to `sender`.
    #[must_use]
    pub fn with_heal_queue(mut self, sender: HealSender) -> Self {
        self.heal_queue = Some(sender);
        self
    }

    pub const fn builder(&self) -> &AnchorBuilder {
        &self.builder
    }

    pub const fn resolver(&self) -> &AnchorResolver {
        &self.resolver
    }

    /// Shared epoch to hand to the heal worker.
    pub fn epoch(&self) -> MaterialEpoch {
        self.epoch.clone()
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Switch to another material. Heals queued for the old one go stale.
    pub fn load_material(&mut self, material_id: &str) -> u64 {
        let epoch = self.epoch.advance();
        self.tracker.reset();
        tracing::debug!("Loaded material {material_id} (epoch {epoch})");
        epoch
    }

    fn begin_pass(&mut self, highlights: &[Highlight]) -> RenderReport {
        self.generation += 1;
        self.tracker
            .begin_pass(highlights.iter().map(|highlight| &highlight.id));
        RenderReport {
            generation: self.generation,
            ..RenderReport::default()
        }
    }

    /// Fresh anchor for a contextual match, when one should be persisted.
    fn healed_anchor(
        &self,
        doc: &Document,
        root: NodeId,
        highlight: &Highlight,
        resolution: &Resolution,
    ) -> Option<Anchor> {
        if !resolution.needs_heal() || self.heal_queue.is_none() {
            return None;
        }
        self.builder
            .build(doc, root, &resolution.range)
            .filter(|anchor| *anchor != highlight.anchor)
    }

    /// Queue `anchor` for persistence, at most once per highlight set.
    fn queue_heal(&mut self, highlight: &Highlight, anchor: Anchor) -> bool {
        let Some(queue) = &self.heal_queue else {
            return false;
        };
        if !self.tracker.claim(&highlight.id) {
            return false;
        }

        let request = HealRequest {
            highlight_id: highlight.id.clone(),
            anchor,
            epoch: self.epoch.current(),
        };
        if queue.send(request).is_err() {
            tracing::warn!("Heal queue closed; dropping heal for {}", highlight.id);
            return false;
        }
        true
    }

    /// Paint `highlights` into `doc` by wrapping their text.
    pub fn render_wrapped(
        &mut self,
        doc: &mut Document,
        root: NodeId,
        highlights: &[Highlight],
    ) -> RenderReport {
        let mut report = self.begin_pass(highlights);
        self.wrap.clear(doc, root);

        for highlight in highlights {
            let mut painted = false;
            for resolution in self.resolver.candidates(doc, root, &highlight.anchor) {
                // The range is invalidated by wrapping, so build the anchor first
                let healed = self.healed_anchor(doc, root, highlight, &resolution);
                if self
                    .wrap
                    .surround(doc, &resolution.range, &highlight.id, highlight.color)
                    .is_some()
                {
                    if let Some(anchor) = healed {
                        if self.queue_heal(highlight, anchor) {
                            report.healed.push(highlight.id.clone());
                        }
                    }
                    painted = true;
                    break;
                }
                tracing::debug!("Cannot wrap {} here; trying next occurrence", highlight.id);
            }

            if painted {
                report.rendered.push(highlight.id.clone());
            } else {
                tracing::debug!("Highlight {} is unrenderable", highlight.id);
                report.unrenderable.push(highlight.id.clone());
            }
        }

        report
    }

    /// Paint `highlights` as overlay boxes over `container`.
    pub fn render_overlay<L: TextLayout>(
        &mut self,
        doc: &Document,
        container: NodeId,
        highlights: &[Highlight],
        renderer: &OverlayRenderer<L>,
    ) -> (OverlayLayer, RenderReport) {
        let mut report = self.begin_pass(highlights);
        let mut layer = OverlayLayer::default();

        for highlight in highlights {
            let Some(resolution) = self.resolver.resolve(doc, container, &highlight.anchor) else {
                tracing::debug!("Highlight {} is unrenderable", highlight.id);
                report.unrenderable.push(highlight.id.clone());
                continue;
            };
            if let Some(anchor) = self.healed_anchor(doc, container, highlight, &resolution) {
                if self.queue_heal(highlight, anchor) {
                    report.healed.push(highlight.id.clone());
                }
            }

            let boxes = renderer.boxes_for(
                doc,
                container,
                &resolution.range,
                &highlight.id,
                highlight.color,
            );
            if boxes.is_empty() {
                report.unrenderable.push(highlight.id.clone());
            } else {
                layer.extend(boxes);
                report.rendered.push(highlight.id.clone());
            }
        }

        (layer, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{heal_channel, HealWorker, TextIndex};
    use crate::device::StaticDeviceId;
    use crate::document::{TextLayerPage, TextRange, TextRun};
    use crate::models::HighlightColor;
    use crate::render::{SpanBoxLayout, WRAPPER_CLASS};
    use crate::store::{HighlightStore, LocalHighlightStore};
    use crate::util::char_len;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const ARTICLE: &str = r#"<article><h2 id="deposits">Deposit protection</h2><p id="limits">Under UK rules the FSCS compensation limit for deposits is £85,000 per person.</p><p>Joint accounts are covered up to £170,000.</p></article>"#;

    fn range_of(doc: &Document, quote: &str, occurrence: usize) -> TextRange {
        let index = TextIndex::build(doc, doc.root());
        let start = index.find_all(quote, 0, index.len())[occurrence];
        index.range(start, start + char_len(quote)).unwrap()
    }

    fn create(doc: &Document, quote: &str, color: HighlightColor) -> Highlight {
        let anchor = AnchorBuilder::default()
            .build(doc, doc.root(), &range_of(doc, quote, 0))
            .unwrap();
        Highlight::new("user-1", "material-1", anchor, color, "device-a")
    }

    fn local_store() -> Arc<LocalHighlightStore> {
        Arc::new(LocalHighlightStore::open_in_memory(Arc::new(StaticDeviceId::new("device-a"))).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_persist_reload_paints_highlight() {
        let store = local_store();
        let doc = Document::from_html(ARTICLE);
        store
            .save(&create(&doc, "FSCS compensation limit", HighlightColor::Yellow))
            .await
            .unwrap();

        // Fresh render of the same material
        let mut reloaded = Document::from_html(ARTICLE);
        let highlights = store.get_for_material("user-1", "material-1").await.unwrap();
        let mut session = RenderSession::default();
        session.load_material("material-1");
        let root = reloaded.root();
        let report = session.render_wrapped(&mut reloaded, root, &highlights);

        assert_eq!(report.rendered, vec![highlights[0].id.clone()]);
        assert!(report.unrenderable.is_empty());
        let marks = reloaded.elements_with_class(reloaded.root(), WRAPPER_CLASS);
        assert_eq!(marks.len(), 1);
        assert_eq!(reloaded.text_content(marks[0]), "FSCS compensation limit");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_highlight_removes_wrapper_on_next_pass() {
        let store = local_store();
        let mut doc = Document::from_html(ARTICLE);
        let first = store
            .save(&create(&doc, "compensation limit", HighlightColor::Green))
            .await
            .unwrap();
        store
            .save(&create(&doc, "Joint accounts", HighlightColor::Blue))
            .await
            .unwrap();

        let mut session = RenderSession::default();
        let root = doc.root();
        let highlights = store.get_for_material("user-1", "material-1").await.unwrap();
        session.render_wrapped(&mut doc, root, &highlights);
        assert_eq!(doc.elements_with_class(doc.root(), WRAPPER_CLASS).len(), 2);

        store.delete("user-1", &first.id).await.unwrap();
        let highlights = store.get_for_material("user-1", "material-1").await.unwrap();
        let report = session.render_wrapped(&mut doc, root, &highlights);

        assert_eq!(report.rendered.len(), 1);
        let marks = doc.elements_with_class(doc.root(), WRAPPER_CLASS);
        assert_eq!(marks.len(), 1);
        assert_eq!(doc.text_content(marks[0]), "Joint accounts");
        assert!(!doc.inner_html(doc.root()).contains(first.id.as_str()));
    }

    #[test]
    fn repeated_passes_never_nest_wrappers() {
        let mut doc = Document::from_html(ARTICLE);
        let highlights = vec![create(&doc, "FSCS compensation limit", HighlightColor::Red)];
        let mut session = RenderSession::default();
        let root = doc.root();
        for _ in 0..3 {
            session.render_wrapped(&mut doc, root, &highlights);
        }
        let marks = doc.elements_with_class(doc.root(), WRAPPER_CLASS);
        assert_eq!(marks.len(), 1);
        assert_eq!(doc.elements_with_class(marks[0], WRAPPER_CLASS).len(), 1);
        assert_eq!(session.generation(), 3);
    }

    #[test]
    fn unwrappable_occurrence_falls_through_to_next() {
        let source = "<div><p>alpha <em>beta</em> gamma</p><p>alpha beta gamma</p></div>";
        let doc = Document::from_html(source);
        let mut highlight = create(&doc, "alpha beta", HighlightColor::Yellow);
        highlight.anchor.selector = "div".to_string();
        highlight.anchor.text_quote = None;

        let mut target = Document::from_html(source);
        let root = target.root();
        let report = RenderSession::default().render_wrapped(&mut target, root, &[highlight]);
        assert_eq!(report.rendered.len(), 1);

        let marks = target.elements_with_class(target.root(), WRAPPER_CLASS);
        let second_paragraph = target.children(target.children(target.root())[0])[1];
        assert!(target.contains(second_paragraph, marks[0]));
    }

    #[test]
    fn missing_text_is_reported_unrenderable() {
        let doc = Document::from_html(ARTICLE);
        let highlight = create(&doc, "FSCS compensation limit", HighlightColor::Yellow);
        let mut other = Document::from_html("<p>Nothing relevant here.</p>");
        let root = other.root();
        let report = RenderSession::default().render_wrapped(&mut other, root, &[highlight.clone()]);
        assert_eq!(report.unrenderable, vec![highlight.id]);
        assert!(other.elements_with_class(other.root(), WRAPPER_CLASS).is_empty());
    }

    #[test]
    fn loading_material_advances_shared_epoch() {
        let mut session = RenderSession::default();
        let epoch = session.epoch();
        let first = session.load_material("material-1");
        assert_eq!(epoch.current(), first);

        let second = session.load_material("material-2");
        assert!(second > first);
        assert_eq!(epoch.current(), second);
    }

    #[test]
    fn overlay_pass_paints_boxes_per_page() {
        let pages = [
            TextLayerPage {
                page_number: 1,
                width: 400.0,
                height: 500.0,
                runs: vec![TextRun {
                    text: "Capital adequacy ratio".to_string(),
                    x: 20.0,
                    y: 40.0,
                    width: 220.0,
                    height: 14.0,
                }],
            },
            TextLayerPage {
                page_number: 2,
                width: 400.0,
                height: 500.0,
                runs: vec![TextRun {
                    text: "Liquidity coverage ratio".to_string(),
                    x: 20.0,
                    y: 40.0,
                    width: 240.0,
                    height: 14.0,
                }],
            },
        ];
        let doc = Document::from_text_layer(&pages);
        let highlight = create(&doc, "coverage ratio", HighlightColor::Blue);
        assert_eq!(highlight.anchor.page_number, Some(2));

        let mut session = RenderSession::default();
        let renderer = OverlayRenderer::new(SpanBoxLayout);
        let (layer, report) = session.render_overlay(&doc, doc.root(), &[highlight.clone()], &renderer);
        assert_eq!(report.rendered, vec![highlight.id.clone()]);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.hit_test(130.0, 545.0), Some(&highlight.id));
    }

    /// Local store that counts anchor updates.
    struct CountingStore {
        inner: Arc<LocalHighlightStore>,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl HighlightStore for CountingStore {
        async fn save(&self, highlight: &Highlight) -> crate::Result<Highlight> {
            self.inner.save(highlight).await
        }
        async fn delete(&self, user_id: &str, id: &HighlightId) -> crate::Result<()> {
            self.inner.delete(user_id, id).await
        }
        async fn get(&self, id: &HighlightId) -> crate::Result<Option<Highlight>> {
            self.inner.get(id).await
        }
        async fn get_for_material(&self, user_id: &str, material_id: &str) -> crate::Result<Vec<Highlight>> {
            self.inner.get_for_material(user_id, material_id).await
        }
        fn subscribe_to_material(
            &self,
            user_id: &str,
            material_id: &str,
            callback: crate::store::SnapshotCallback,
        ) -> crate::store::Subscription {
            self.inner.subscribe_to_material(user_id, material_id, callback)
        }
        async fn update_anchor(&self, id: &HighlightId, anchor: crate::Anchor) -> crate::Result<Highlight> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update_anchor(id, anchor).await
        }
        async fn save_note(&self, id: &HighlightId, content: &str) -> crate::Result<Highlight> {
            self.inner.save_note(id, content).await
        }
        async fn delete_note(&self, id: &HighlightId) -> crate::Result<Highlight> {
            self.inner.delete_note(id).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restructured_document_heals_exactly_once() {
        let store = Arc::new(CountingStore {
            inner: local_store(),
            updates: AtomicUsize::new(0),
        });
        let original = Document::from_html(ARTICLE);
        let saved = store
            .save(&create(&original, "FSCS compensation limit", HighlightColor::Yellow))
            .await
            .unwrap();
        assert_eq!(saved.anchor.selector, "#limits");

        let restructured = r#"<main><section class="body"><div>Under UK rules the FSCS compensation limit for deposits is £85,000 per person.</div></section></main>"#;
        let (sender, receiver) = heal_channel();
        let mut session = RenderSession::default().with_heal_queue(sender);
        let mut worker = HealWorker::new(Arc::clone(&store), session.epoch(), receiver);
        session.load_material("material-1");

        // Two passes over the same stale highlight set before the heal lands
        let highlights = store.get_for_material("user-1", "material-1").await.unwrap();
        let mut doc = Document::from_html(restructured);
        let root = doc.root();
        let first = session.render_wrapped(&mut doc, root, &highlights);
        let second = session.render_wrapped(&mut doc, root, &highlights);
        assert_eq!(first.healed, vec![saved.id.clone()]);
        assert!(second.healed.is_empty());
        assert_eq!(second.rendered, vec![saved.id.clone()]);

        assert_eq!(worker.drain().await, 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);

        let healed = store.get(&saved.id).await.unwrap().unwrap();
        assert_eq!(healed.anchor.selector, "main > section.body > div");
        assert_eq!(healed.anchor.selected_text, "FSCS compensation limit");

        // The healed anchor now matches structurally; no further heals
        let reloaded = store.get_for_material("user-1", "material-1").await.unwrap();
        let mut fresh = Document::from_html(restructured);
        let fresh_root = fresh.root();
        let third = session.render_wrapped(&mut fresh, fresh_root, &reloaded);
        assert!(third.healed.is_empty());
        assert_eq!(worker.drain().await, 0);
    }

    #[test]
    fn stale_heals_are_tagged_with_old_epoch() {
        let original = Document::from_html(ARTICLE);
        let highlight = create(&original, "FSCS compensation limit", HighlightColor::Yellow);
        let (sender, mut receiver) = heal_channel();
        let mut session = RenderSession::default().with_heal_queue(sender);
        session.load_material("material-1");

        let mut doc = Document::from_html("<div>Under UK rules the FSCS compensation limit for deposits</div>");
        let root = doc.root();
        session.render_wrapped(&mut doc, root, &[highlight]);
        let queued = receiver.try_recv().unwrap();

        session.load_material("material-2");
        assert_ne!(queued.epoch, session.epoch().current());
    }
}
