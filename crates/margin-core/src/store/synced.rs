//! Local-first store that mirrors writes to a remote.
//!
//! Every write lands locally first. The remote copy is updated best-effort:
//! failures are logged and queued in the outbox for [`SyncedHighlightStore::flush_outbox`].
//! Before a copy is uploaded it is merged with whatever the remote currently
//! holds, so edits made on other devices are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    HighlightStore, LocalHighlightStore, RemoteHighlightStore, SnapshotCallback, Subscription,
};
use crate::db::OutboxOp;
use crate::error::Result;
use crate::models::{Anchor, Highlight, HighlightId};

/// Outcome of pushing queued writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pushed: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct SyncedHighlightStore<R: RemoteHighlightStore + ?Sized> {
    local: LocalHighlightStore,
    remote: Arc<R>,
    poll_interval: Option<Duration>,
}

impl<R: RemoteHighlightStore + ?Sized> Clone for SyncedHighlightStore<R> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: Arc::clone(&self.remote),
            poll_interval: self.poll_interval,
        }
    }
}

impl<R: RemoteHighlightStore + ?Sized> SyncedHighlightStore<R> {
    pub const fn new(local: LocalHighlightStore, remote: Arc<R>) -> Self {
        Self {
            local,
            remote,
            poll_interval: None,
        }
    }

    /// Poll the remote every `interval` while a material is watched.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    pub const fn local(&self) -> &LocalHighlightStore {
        &self.local
    }

    /// Merge the remote copy into `highlight` and upload the result.
    ///
    /// Returns the copy that now lives in both stores.
    async fn reconcile(&self, highlight: &Highlight) -> Result<Highlight> {
        let merged = match self.remote.get(&highlight.id).await? {
            Some(remote) if remote != *highlight => self.local.save(&remote).await?,
            _ => highlight.clone(),
        };
        self.upload(&merged).await?;
        Ok(merged)
    }

    async fn upload(&self, highlight: &Highlight) -> Result<()> {
        self.remote.put(highlight).await?;
        if let Err(error) = self.local.acknowledge(&highlight.id).await {
            tracing::warn!("Failed to clear outbox for {}: {error}", highlight.id);
        }
        Ok(())
    }

    /// Best-effort reconcile; on failure the write is queued and the local
    /// copy returned.
    async fn push(&self, highlight: Highlight) -> Highlight {
        match self.reconcile(&highlight).await {
            Ok(merged) => merged,
            Err(error) => {
                tracing::warn!("Remote save failed for {}: {error}", highlight.id);
                self.queue(&highlight.id, OutboxOp::Upsert, &highlight.user_id)
                    .await;
                highlight
            }
        }
    }

    async fn queue(&self, id: &HighlightId, op: OutboxOp, user_id: &str) {
        if let Err(error) = self.local.enqueue(id, op, user_id).await {
            tracing::warn!("Failed to queue {op} for {id}: {error}");
        }
    }

    /// Retry every queued write of `user_id`.
    pub async fn flush_outbox(&self, user_id: &str) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        for entry in self.local.pending(user_id).await? {
            let result = match entry.op {
                OutboxOp::Upsert => match self.local.get(&entry.highlight_id).await? {
                    Some(highlight) => self.reconcile(&highlight).await.map(|_| {
                        report.pushed += 1;
                    }),
                    None => Ok(()),
                },
                OutboxOp::Delete => self.remote.delete(&entry.highlight_id).await.map(|()| {
                    report.deleted += 1;
                }),
            };

            match result {
                Ok(()) => self.local.acknowledge(&entry.highlight_id).await?,
                Err(error) => {
                    tracing::warn!(
                        "Outbox {} for {} still failing: {error}",
                        entry.op,
                        entry.highlight_id
                    );
                    report.failed += 1;
                }
            }
        }

        if report.failed == 0 {
            tracing::info!(
                "Outbox flushed ({} pushed, {} deleted)",
                report.pushed,
                report.deleted
            );
        }
        Ok(report)
    }

    /// Pull the remote copies of a material into the local store.
    ///
    /// Remote failures are logged; the local copy stays authoritative.
    async fn refresh(&self, user_id: &str, material_id: &str) {
        match self.remote.fetch_material(user_id, material_id).await {
            Ok(remote) => {
                for highlight in remote {
                    let id = highlight.id.clone();
                    if let Err(error) = self.absorb(user_id, material_id, highlight).await {
                        tracing::warn!("Failed to merge remote highlight {id}: {error}");
                    }
                }
            }
            Err(error) => {
                tracing::warn!("Remote fetch failed for {material_id}, serving local copy: {error}");
            }
        }
    }

    /// Merge one remote copy into the local store, pushing back when the
    /// local side still had newer content.
    async fn absorb(&self, user_id: &str, material_id: &str, remote: Highlight) -> Result<()> {
        if remote.user_id != user_id || remote.material_id != material_id {
            tracing::debug!("Ignoring remote highlight {} for another scope", remote.id);
            return Ok(());
        }
        if self.local.is_pending_delete(&remote.id).await? {
            return Ok(());
        }
        if self.local.get(&remote.id).await?.as_ref() == Some(&remote) {
            return Ok(());
        }

        let merged = self.local.save(&remote).await?;
        if merged != remote {
            if let Err(error) = self.upload(&merged).await {
                tracing::warn!("Remote save failed for {}: {error}", merged.id);
                self.queue(&merged.id, OutboxOp::Upsert, &merged.user_id)
                    .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: RemoteHighlightStore + ?Sized + 'static> HighlightStore for SyncedHighlightStore<R> {
    async fn save(&self, highlight: &Highlight) -> Result<Highlight> {
        let stored = self.local.save(highlight).await?;
        Ok(self.push(stored).await)
    }

    async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<()> {
        self.local.delete(user_id, id).await?;

        if let Err(error) = self.remote.delete(id).await {
            tracing::warn!("Remote delete failed for {id}: {error}");
            self.queue(id, OutboxOp::Delete, user_id).await;
        } else if let Err(error) = self.local.acknowledge(id).await {
            tracing::warn!("Failed to clear outbox for {id}: {error}");
        }
        Ok(())
    }

    async fn get(&self, id: &HighlightId) -> Result<Option<Highlight>> {
        self.local.get(id).await
    }

    async fn get_for_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>> {
        self.refresh(user_id, material_id).await;
        self.local.get_for_material(user_id, material_id).await
    }

    /// Watch the merged highlight set of a material.
    ///
    /// Remote copies are absorbed before the first snapshot, then again on
    /// every poll tick. Local changes, including absorbed remote edits, are
    /// delivered through the local store's change feed.
    fn subscribe_to_material(
        &self,
        user_id: &str,
        material_id: &str,
        callback: SnapshotCallback,
    ) -> Subscription {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Cannot subscribe to {material_id} outside a tokio runtime");
            return Subscription::inert();
        };

        let store = self.clone();
        let user_id = user_id.to_string();
        let material_id = material_id.to_string();

        let task = runtime.spawn(async move {
            store.refresh(&user_id, &material_id).await;
            let _local = store
                .local
                .subscribe_to_material(&user_id, &material_id, callback);

            let Some(interval) = store.poll_interval else {
                std::future::pending::<()>().await;
                return;
            };
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.refresh(&user_id, &material_id).await;
            }
        });

        Subscription::new(task)
    }

    async fn update_anchor(&self, id: &HighlightId, anchor: Anchor) -> Result<Highlight> {
        let stored = self.local.update_anchor(id, anchor).await?;
        Ok(self.push(stored).await)
    }

    async fn save_note(&self, id: &HighlightId, content: &str) -> Result<Highlight> {
        let stored = self.local.save_note(id, content).await?;
        Ok(self.push(stored).await)
    }

    async fn delete_note(&self, id: &HighlightId) -> Result<Highlight> {
        let stored = self.local.delete_note(id).await?;
        Ok(self.push(stored).await)
    }
}
