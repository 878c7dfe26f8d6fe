//! `SQLite`-backed highlight store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use super::{HighlightStore, MaterialChange, SnapshotCallback, Subscription};
use crate::db::{
    require, Database, HighlightRepository, OutboxEntry, OutboxOp, OutboxRepository,
    SqliteHighlightRepository, SqliteOutboxRepository,
};
use crate::device::DeviceIdProvider;
use crate::error::{Error, Result};
use crate::models::{Anchor, Highlight, HighlightId};
use crate::util::normalize_text_option;

const CHANGE_CAPACITY: usize = 64;

/// Thread-safe local store. Cloning shares the same database.
#[derive(Clone)]
pub struct LocalHighlightStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    device: Arc<dyn DeviceIdProvider>,
    changes: broadcast::Sender<MaterialChange>,
}

impl LocalHighlightStore {
    /// Open a store at the given filesystem path.
    pub fn open(db_path: impl Into<PathBuf>, device: Arc<dyn DeviceIdProvider>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path)?;
        Ok(Self::from_database(db, Some(db_path), device))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory(device: Arc<dyn DeviceIdProvider>) -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, None, device))
    }

    fn from_database(
        db: Database,
        db_path: Option<PathBuf>,
        device: Arc<dyn DeviceIdProvider>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            device,
            changes,
        }
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Every highlight owned by `user_id`, grouped by material.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Highlight>> {
        let db = self.db.lock().await;
        SqliteHighlightRepository::new(db.connection()).list_for_user(user_id)
    }

    fn notify(&self, highlight: &Highlight) {
        // No receivers is not an error
        let _ = self.changes.send(MaterialChange {
            user_id: highlight.user_id.clone(),
            material_id: highlight.material_id.clone(),
        });
    }

    /// Apply `edit` to the stored highlight and persist it.
    async fn mutate(
        &self,
        id: &HighlightId,
        edit: impl FnOnce(&mut Highlight, &str) + Send,
    ) -> Result<Highlight> {
        let updated = {
            let db = self.db.lock().await;
            let repo = SqliteHighlightRepository::new(db.connection());
            let mut highlight = require(&repo, id)?;
            edit(&mut highlight, self.device.device_id());
            repo.upsert(&highlight)?;
            highlight
        };
        self.notify(&updated);
        Ok(updated)
    }

    pub(crate) async fn enqueue(&self, id: &HighlightId, op: OutboxOp, user_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).enqueue(id, op, user_id)
    }

    pub(crate) async fn pending(&self, user_id: &str) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).pending(user_id)
    }

    pub(crate) async fn acknowledge(&self, id: &HighlightId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).acknowledge(id)
    }

    pub(crate) async fn is_pending_delete(&self, id: &HighlightId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).is_pending_delete(id)
    }
}

#[async_trait]
impl HighlightStore for LocalHighlightStore {
    async fn save(&self, highlight: &Highlight) -> Result<Highlight> {
        if !highlight.anchor.has_usable_text() {
            return Err(Error::InvalidInput(
                "highlight text must have at least 3 characters".to_string(),
            ));
        }

        let stored = {
            let db = self.db.lock().await;
            let repo = SqliteHighlightRepository::new(db.connection());
            let stored = match repo.get(&highlight.id)? {
                Some(existing) => {
                    if existing.user_id != highlight.user_id
                        || existing.material_id != highlight.material_id
                    {
                        return Err(Error::InvalidInput(format!(
                            "highlight {} cannot change owner or material",
                            highlight.id
                        )));
                    }
                    existing.merge(highlight, self.device.device_id())
                }
                None => highlight.clone(),
            };
            repo.upsert(&stored)?;
            stored
        };

        tracing::debug!("Saved highlight {}", stored.id);
        self.notify(&stored);
        Ok(stored)
    }

    async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<()> {
        let removed = {
            let db = self.db.lock().await;
            let repo = SqliteHighlightRepository::new(db.connection());
            let existing = require(&repo, id)?;
            if existing.user_id != user_id {
                return Err(Error::NotFound(id.to_string()));
            }
            repo.delete(id)?;
            existing
        };
        tracing::debug!("Deleted highlight {id}");
        self.notify(&removed);
        Ok(())
    }

    async fn get(&self, id: &HighlightId) -> Result<Option<Highlight>> {
        let db = self.db.lock().await;
        SqliteHighlightRepository::new(db.connection()).get(id)
    }

    async fn get_for_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>> {
        let db = self.db.lock().await;
        SqliteHighlightRepository::new(db.connection()).list_for_material(user_id, material_id)
    }

    fn subscribe_to_material(
        &self,
        user_id: &str,
        material_id: &str,
        mut callback: SnapshotCallback,
    ) -> Subscription {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Cannot subscribe to {material_id} outside a tokio runtime");
            return Subscription::inert();
        };

        let store = self.clone();
        let mut changes = self.changes.subscribe();
        let user_id = user_id.to_string();
        let material_id = material_id.to_string();

        let task = runtime.spawn(async move {
            let deliver = |snapshot: Result<Vec<Highlight>>, callback: &mut SnapshotCallback| {
                match snapshot {
                    Ok(highlights) => callback(highlights),
                    Err(error) => {
                        tracing::warn!("Failed to load highlights for {material_id}: {error}");
                    }
                }
            };

            deliver(
                store.get_for_material(&user_id, &material_id).await,
                &mut callback,
            );

            loop {
                match changes.recv().await {
                    Ok(change)
                        if change.user_id == user_id && change.material_id == material_id => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscription lagged by {skipped} changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                deliver(
                    store.get_for_material(&user_id, &material_id).await,
                    &mut callback,
                );
            }
        });

        Subscription::new(task)
    }

    async fn update_anchor(&self, id: &HighlightId, anchor: Anchor) -> Result<Highlight> {
        self.mutate(id, |highlight, device_id| {
            highlight.set_anchor(anchor, device_id);
        })
        .await
    }

    async fn save_note(&self, id: &HighlightId, content: &str) -> Result<Highlight> {
        let content = normalize_text_option(Some(content.to_string()))
            .ok_or_else(|| Error::InvalidInput("note must not be empty".to_string()))?;
        self.mutate(id, |highlight, device_id| {
            highlight.set_note(content, device_id);
        })
        .await
    }

    async fn delete_note(&self, id: &HighlightId) -> Result<Highlight> {
        self.mutate(id, Highlight::clear_note).await
    }
}
