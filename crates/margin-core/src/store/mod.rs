//! Highlight persistence and sync boundary.
//!
//! Every client talks to highlights through [`HighlightStore`]. The local
//! store is authoritative for reads; the synced store layers a best-effort
//! remote on top of it.

mod local;
mod remote;
mod synced;

pub use local::LocalHighlightStore;
pub use remote::{HttpRemoteStore, RemoteHighlightStore};
pub use synced::{FlushReport, SyncedHighlightStore};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::models::{Anchor, Highlight, HighlightId};
use crate::Result;

/// Callback receiving the full highlight set of a material on every change.
pub type SnapshotCallback = Box<dyn FnMut(Vec<Highlight>) + Send + 'static>;

/// Storage operations for highlights.
#[async_trait]
pub trait HighlightStore: Send + Sync {
    /// Insert or update a highlight, returning the stored copy.
    ///
    /// When a copy with the same id already exists the two are merged by
    /// version vector, so an older copy never overwrites a newer one.
    async fn save(&self, highlight: &Highlight) -> Result<Highlight>;

    /// Remove `user_id`'s highlight. Another user's highlight is `NotFound`.
    async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<()>;

    async fn get(&self, id: &HighlightId) -> Result<Option<Highlight>>;

    /// Highlights of `user_id` on `material_id`, oldest first.
    async fn get_for_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>>;

    /// Watch a material's highlights.
    ///
    /// The current snapshot is delivered first, then a fresh snapshot after
    /// every change. Never fails synchronously: problems are logged and the
    /// returned subscription is inert.
    fn subscribe_to_material(
        &self,
        user_id: &str,
        material_id: &str,
        callback: SnapshotCallback,
    ) -> Subscription;

    /// Replace a highlight's anchor after self-healing.
    async fn update_anchor(&self, id: &HighlightId, anchor: Anchor) -> Result<Highlight>;

    async fn save_note(&self, id: &HighlightId, content: &str) -> Result<Highlight>;

    async fn delete_note(&self, id: &HighlightId) -> Result<Highlight>;
}

/// Material whose highlight set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MaterialChange {
    pub user_id: String,
    pub material_id: String,
}

/// Handle to a material subscription. Dropping it stops delivery.
#[derive(Debug, Default)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) const fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription that never delivers anything.
    pub const fn inert() -> Self {
        Self { task: None }
    }

    pub const fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
