//! Sync outbox repository implementation
//!
//! The outbox holds writes the remote store has not acknowledged yet. One row
//! per highlight: a later write replaces the queued operation.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::HighlightId;
use crate::util::now_iso;

/// Pending remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxOp {
    Upsert,
    Delete,
}

impl OutboxOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OutboxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown outbox op '{other}'"))),
        }
    }
}

/// Queued operation awaiting the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub highlight_id: HighlightId,
    pub op: OutboxOp,
    pub user_id: String,
    pub queued_at: String,
}

/// Trait for outbox storage operations
pub trait OutboxRepository {
    /// Queue `op` for a highlight, replacing anything already queued for it
    fn enqueue(&self, id: &HighlightId, op: OutboxOp, user_id: &str) -> Result<()>;

    /// Every queued entry of a user, oldest first
    fn pending(&self, user_id: &str) -> Result<Vec<OutboxEntry>>;

    /// Drop the queued entry for a highlight
    fn acknowledge(&self, id: &HighlightId) -> Result<()>;

    /// Whether a delete is queued for the highlight
    fn is_pending_delete(&self, id: &HighlightId) -> Result<bool>;
}

/// `SQLite` implementation of `OutboxRepository`
pub struct SqliteOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl OutboxRepository for SqliteOutboxRepository<'_> {
    fn enqueue(&self, id: &HighlightId, op: OutboxOp, user_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_outbox (highlight_id, op, user_id, queued_at)
             VALUES (?, ?, ?, ?)",
            params![id.as_str(), op.as_str(), user_id, now_iso()],
        )?;
        Ok(())
    }

    fn pending(&self, user_id: &str) -> Result<Vec<OutboxEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT highlight_id, op, user_id, queued_at
             FROM sync_outbox
             WHERE user_id = ?
             ORDER BY queued_at ASC, highlight_id ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, op, user_id, queued_at)| {
                Ok(OutboxEntry {
                    highlight_id: HighlightId::from(id),
                    op: op.parse()?,
                    user_id,
                    queued_at,
                })
            })
            .collect()
    }

    fn acknowledge(&self, id: &HighlightId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_outbox WHERE highlight_id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn is_pending_delete(&self, id: &HighlightId) -> Result<bool> {
        let pending: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_outbox WHERE highlight_id = ? AND op = 'delete')",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_enqueue_replaces_previous_op() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteOutboxRepository::new(db.connection());
        let id = HighlightId::from("hl_1_abc");

        repo.enqueue(&id, OutboxOp::Upsert, "user-1").unwrap();
        repo.enqueue(&id, OutboxOp::Delete, "user-1").unwrap();

        let pending = repo.pending("user-1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, OutboxOp::Delete);
        assert!(repo.is_pending_delete(&id).unwrap());
        assert!(repo.pending("user-2").unwrap().is_empty());
    }

    #[test]
    fn test_acknowledge_clears_entry() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteOutboxRepository::new(db.connection());
        let id = HighlightId::from("hl_1_abc");

        repo.enqueue(&id, OutboxOp::Upsert, "user-1").unwrap();
        repo.acknowledge(&id).unwrap();
        assert!(repo.pending("user-1").unwrap().is_empty());
        assert!(!repo.is_pending_delete(&id).unwrap());
    }

    #[test]
    fn test_op_parsing() {
        assert_eq!("upsert".parse::<OutboxOp>().unwrap(), OutboxOp::Upsert);
        assert!("merge".parse::<OutboxOp>().is_err());
    }
}
