//! Self-healing of stale anchors.
//!
//! When a highlight only resolves contextually its stored selector no longer
//! points at the text. The render pass builds a fresh anchor for the live
//! range and queues it here; a background worker persists it. Rendering never
//! waits on the write.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::{Anchor, HighlightId};
use crate::store::HighlightStore;

/// Counter identifying the material currently on screen.
///
/// Bumped whenever the displayed material changes; heal requests carry the
/// value they were issued under and are dropped once it moves on.
#[derive(Debug, Clone, Default)]
pub struct MaterialEpoch(Arc<AtomicU64>);

impl MaterialEpoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Move to the next epoch and return it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A rebuilt anchor waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealRequest {
    pub highlight_id: HighlightId,
    pub anchor: Anchor,
    pub epoch: u64,
}

/// Sending half of the heal queue.
pub type HealSender = mpsc::UnboundedSender<HealRequest>;

/// Create the heal queue.
pub fn heal_channel() -> (HealSender, mpsc::UnboundedReceiver<HealRequest>) {
    mpsc::unbounded_channel()
}

/// Remembers which highlights were already healed for the current highlight set.
///
/// Without it every render pass would re-queue the same heal until the store
/// round-trips the new anchor back.
#[derive(Debug, Default)]
pub struct HealTracker {
    fingerprint: Option<u64>,
    processed: HashSet<HighlightId>,
}

impl HealTracker {
    /// Start a render pass over `ids`. Clears the processed set when the
    /// set of highlight ids differs from the previous pass.
    pub fn begin_pass<'a>(&mut self, ids: impl IntoIterator<Item = &'a HighlightId>) {
        let mut sorted: Vec<&HighlightId> = ids.into_iter().collect();
        sorted.sort();
        let mut hasher = DefaultHasher::new();
        sorted.hash(&mut hasher);
        let fingerprint = hasher.finish();

        if self.fingerprint != Some(fingerprint) {
            self.processed.clear();
            self.fingerprint = Some(fingerprint);
        }
    }

    /// Mark `id` as healed. Returns `false` if it was already handled.
    pub fn claim(&mut self, id: &HighlightId) -> bool {
        self.processed.insert(id.clone())
    }

    pub fn reset(&mut self) {
        self.fingerprint = None;
        self.processed.clear();
    }
}

/// Drains the heal queue into a store.
pub struct HealWorker<S: HighlightStore + ?Sized> {
    store: Arc<S>,
    epoch: MaterialEpoch,
    receiver: mpsc::UnboundedReceiver<HealRequest>,
}

impl<S: HighlightStore + ?Sized> HealWorker<S> {
    pub const fn new(
        store: Arc<S>,
        epoch: MaterialEpoch,
        receiver: mpsc::UnboundedReceiver<HealRequest>,
    ) -> Self {
        Self {
            store,
            epoch,
            receiver,
        }
    }

    /// Process requests until every sender is gone. Returns the number of
    /// anchors written.
    pub async fn run(mut self) -> usize {
        let mut healed = 0;
        while let Some(request) = self.receiver.recv().await {
            if self.apply(request).await {
                healed += 1;
            }
        }
        healed
    }

    /// Process whatever is queued right now without waiting for more.
    pub async fn drain(&mut self) -> usize {
        let mut healed = 0;
        while let Ok(request) = self.receiver.try_recv() {
            if self.apply(request).await {
                healed += 1;
            }
        }
        healed
    }

    async fn apply(&self, request: HealRequest) -> bool {
        if request.epoch != self.epoch.current() {
            tracing::debug!(
                "Dropping stale heal for {} (epoch {})",
                request.highlight_id,
                request.epoch
            );
            return false;
        }

        match self
            .store
            .update_anchor(&request.highlight_id, request.anchor)
            .await
        {
            Ok(_) => {
                tracing::info!("Healed anchor for highlight {}", request.highlight_id);
                true
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to persist healed anchor for {}: {error}",
                    request.highlight_id
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticDeviceId;
    use crate::models::{Highlight, HighlightColor, TextQuote};
    use crate::store::LocalHighlightStore;

    fn anchor(selector: &str) -> Anchor {
        Anchor {
            selector: selector.to_string(),
            start_offset: 0,
            end_offset: 4,
            selected_text: "FSCS".to_string(),
            before_text: String::new(),
            after_text: " limit".to_string(),
            page_number: None,
            text_quote: Some(TextQuote {
                exact: "FSCS".to_string(),
                prefix: String::new(),
                suffix: " limit".to_string(),
            }),
        }
    }

    #[test]
    fn tracker_claims_once_per_highlight_set() {
        let a = HighlightId::from("hl_1_a");
        let b = HighlightId::from("hl_2_b");
        let mut tracker = HealTracker::default();

        tracker.begin_pass([&a, &b]);
        assert!(tracker.claim(&a));
        assert!(!tracker.claim(&a));

        tracker.begin_pass([&b, &a]);
        assert!(!tracker.claim(&a));

        tracker.begin_pass([&a]);
        assert!(tracker.claim(&a));
    }

    #[test]
    fn epoch_advances_monotonically() {
        let epoch = MaterialEpoch::default();
        let shared = epoch.clone();
        assert_eq!(epoch.current(), 0);
        assert_eq!(shared.advance(), 1);
        assert_eq!(epoch.current(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_persists_current_requests_and_drops_stale_ones() {
        let store = Arc::new(LocalHighlightStore::open_in_memory(Arc::new(StaticDeviceId::new(
            "device-a",
        )))
        .unwrap());
        let highlight = store
            .save(&Highlight::new(
                "user-1",
                "material-1",
                anchor("#old"),
                HighlightColor::Yellow,
                "device-a",
            ))
            .await
            .unwrap();

        let epoch = MaterialEpoch::default();
        let (sender, receiver) = heal_channel();
        let mut worker = HealWorker::new(Arc::clone(&store), epoch.clone(), receiver);

        sender
            .send(HealRequest {
                highlight_id: highlight.id.clone(),
                anchor: anchor("#stale"),
                epoch: 7,
            })
            .unwrap();
        sender
            .send(HealRequest {
                highlight_id: highlight.id.clone(),
                anchor: anchor("p.fresh"),
                epoch: epoch.current(),
            })
            .unwrap();

        assert_eq!(worker.drain().await, 1);
        let stored = store.get(&highlight.id).await.unwrap().unwrap();
        assert_eq!(stored.anchor.selector, "p.fresh");
        assert_eq!(stored.versions.get("device-a"), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_logs_and_skips_missing_highlights() {
        let store = Arc::new(
            LocalHighlightStore::open_in_memory(Arc::new(StaticDeviceId::new("device-a")))
                .unwrap(),
        );
        let (sender, receiver) = heal_channel();
        let worker = HealWorker::new(store, MaterialEpoch::default(), receiver);
        sender
            .send(HealRequest {
                highlight_id: HighlightId::from("hl_missing"),
                anchor: anchor("p"),
                epoch: 0,
            })
            .unwrap();
        drop(sender);
        assert_eq!(worker.run().await, 0);
    }
}
