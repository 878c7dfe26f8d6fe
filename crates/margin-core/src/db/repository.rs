//! Highlight repository implementation

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Highlight, HighlightId};

/// Trait for highlight storage operations
pub trait HighlightRepository {
    /// Insert a highlight or replace the stored row with the same id
    fn upsert(&self, highlight: &Highlight) -> Result<()>;

    /// Get a highlight by ID
    fn get(&self, id: &HighlightId) -> Result<Option<Highlight>>;

    /// Highlights of one user on one material, oldest first
    fn list_for_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>>;

    /// Every highlight of a user, grouped by material
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Highlight>>;

    /// Remove a highlight. Returns `false` when no row matched
    fn delete(&self, id: &HighlightId) -> Result<bool>;
}

/// `SQLite` implementation of `HighlightRepository`
pub struct SqliteHighlightRepository<'a> {
    conn: &'a Connection,
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, material_id, text, anchor, color,
        related_question_id, note, created_at, updated_at, versions
     FROM highlights";

impl<'a> SqliteHighlightRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Raw row with JSON columns still encoded
    fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HighlightRow> {
        Ok(HighlightRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            material_id: row.get(2)?,
            text: row.get(3)?,
            anchor: row.get(4)?,
            color: row.get(5)?,
            related_question_id: row.get(6)?,
            note: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            versions: row.get(10)?,
        })
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Highlight>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(HighlightRow::into_highlight).collect()
    }
}

struct HighlightRow {
    id: String,
    user_id: String,
    material_id: String,
    text: String,
    anchor: String,
    color: String,
    related_question_id: Option<String>,
    note: Option<String>,
    created_at: String,
    updated_at: String,
    versions: String,
}

impl HighlightRow {
    fn into_highlight(self) -> Result<Highlight> {
        Ok(Highlight {
            id: HighlightId::from(self.id),
            user_id: self.user_id,
            material_id: self.material_id,
            text: self.text,
            anchor: serde_json::from_str(&self.anchor)?,
            color: self.color.parse()?,
            related_question_id: self.related_question_id,
            note: self.note.as_deref().map(serde_json::from_str).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            versions: serde_json::from_str(&self.versions)?,
        })
    }
}

impl HighlightRepository for SqliteHighlightRepository<'_> {
    fn upsert(&self, highlight: &Highlight) -> Result<()> {
        let anchor = serde_json::to_string(&highlight.anchor)?;
        let note = highlight
            .note
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let versions = serde_json::to_string(&highlight.versions)?;

        self.conn.execute(
            "INSERT INTO highlights (
                id, user_id, material_id, text, anchor, color,
                related_question_id, note, created_at, updated_at, versions
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                anchor = excluded.anchor,
                color = excluded.color,
                related_question_id = excluded.related_question_id,
                note = excluded.note,
                updated_at = excluded.updated_at,
                versions = excluded.versions",
            params![
                highlight.id.as_str(),
                highlight.user_id,
                highlight.material_id,
                highlight.text,
                anchor,
                highlight.color.as_str(),
                highlight.related_question_id,
                note,
                highlight.created_at,
                highlight.updated_at,
                versions
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &HighlightId) -> Result<Option<Highlight>> {
        self.conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?"),
                params![id.as_str()],
                Self::parse_row,
            )
            .optional()?
            .map(HighlightRow::into_highlight)
            .transpose()
    }

    fn list_for_material(&self, user_id: &str, material_id: &str) -> Result<Vec<Highlight>> {
        self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE user_id = ? AND material_id = ? ORDER BY created_at ASC, id ASC"
            ),
            params![user_id, material_id],
        )
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Highlight>> {
        self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY material_id ASC, created_at ASC, id ASC"
            ),
            params![user_id],
        )
    }

    fn delete(&self, id: &HighlightId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM highlights WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }
}

/// Require a stored highlight, mapping a miss to [`Error::NotFound`]
pub fn require(repo: &impl HighlightRepository, id: &HighlightId) -> Result<Highlight> {
    repo.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Anchor, HighlightColor, TextQuote};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn highlight(material: &str, quote: &str) -> Highlight {
        let anchor = Anchor {
            selector: "p".to_string(),
            start_offset: 0,
            end_offset: quote.chars().count(),
            selected_text: quote.to_string(),
            before_text: String::new(),
            after_text: String::new(),
            page_number: Some(3),
            text_quote: Some(TextQuote {
                exact: quote.to_string(),
                ..TextQuote::default()
            }),
        };
        Highlight::new("user-1", material, anchor, HighlightColor::Green, "device-a")
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup();
        let repo = SqliteHighlightRepository::new(db.connection());

        let mut stored = highlight("material-1", "compensation limit");
        stored.set_note("check the joint account rule", "device-a");
        repo.upsert(&stored).unwrap();

        let fetched = repo.get(&stored.id).unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let db = setup();
        let repo = SqliteHighlightRepository::new(db.connection());

        let mut stored = highlight("material-1", "compensation limit");
        repo.upsert(&stored).unwrap();
        stored.set_color(HighlightColor::Red, "device-a");
        repo.upsert(&stored).unwrap();

        let fetched = repo.get(&stored.id).unwrap().unwrap();
        assert_eq!(fetched.color, HighlightColor::Red);
        assert_eq!(repo.list_for_user("user-1").unwrap().len(), 1);
    }

    #[test]
    fn test_list_for_material() {
        let db = setup();
        let repo = SqliteHighlightRepository::new(db.connection());

        repo.upsert(&highlight("material-1", "first quote")).unwrap();
        repo.upsert(&highlight("material-1", "second quote")).unwrap();
        repo.upsert(&highlight("material-2", "other material")).unwrap();

        let listed = repo.list_for_material("user-1", "material-1").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at <= listed[1].created_at);
        assert!(repo.list_for_material("user-2", "material-1").unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let db = setup();
        let repo = SqliteHighlightRepository::new(db.connection());

        let stored = highlight("material-1", "to delete");
        repo.upsert(&stored).unwrap();
        assert!(repo.delete(&stored.id).unwrap());
        assert!(!repo.delete(&stored.id).unwrap());
        assert!(repo.get(&stored.id).unwrap().is_none());
        assert!(matches!(
            require(&repo, &stored.id),
            Err(Error::NotFound(_))
        ));
    }
}
