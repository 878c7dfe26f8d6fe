//! Highlight model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Anchor, VersionVector};
use crate::util::now_iso;

/// Unique identifier for a highlight: `hl_<unix-ms>_<random suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightId(String);

impl HighlightId {
    /// Create a new time-prefixed highlight ID
    #[must_use]
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random = Uuid::now_v7().simple().to_string();
        let suffix = &random[random.len() - 8..];
        Self(format!("hl_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HighlightId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HighlightId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HighlightId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Highlight color choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Red,
    Blue,
}

impl HighlightColor {
    pub const ALL: [Self; 4] = [Self::Yellow, Self::Green, Self::Red, Self::Blue];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HighlightColor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            "red" => Ok(Self::Red),
            "blue" => Ok(Self::Blue),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown highlight color '{other}'"
            ))),
        }
    }
}

/// Free-text note attached to a highlight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightNote {
    pub content: String,
    pub updated_at: String,
}

/// Which copy supplied the content during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Local,
    Remote,
}

/// A persisted annotation over a document.
///
/// The serialized shape is the storage and sync format shared with every
/// other client, so field names and optionality must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: HighlightId,
    pub user_id: String,
    pub material_id: String,
    /// Denormalized copy of the selected text
    pub text: String,
    pub anchor: Anchor,
    pub color: HighlightColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<HighlightNote>,
    /// Creation timestamp (ISO-8601, UTC)
    pub created_at: String,
    /// Last update timestamp (ISO-8601, UTC)
    pub updated_at: String,
    #[serde(default)]
    pub versions: VersionVector,
}

impl Highlight {
    /// Create a highlight owned by `user_id` on `material_id`, first edited on `device_id`
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        material_id: impl Into<String>,
        anchor: Anchor,
        color: HighlightColor,
        device_id: &str,
    ) -> Self {
        let now = now_iso();
        let mut versions = VersionVector::default();
        versions.increment(device_id);
        Self {
            id: HighlightId::new(),
            user_id: user_id.into(),
            material_id: material_id.into(),
            text: anchor.selected_text.clone(),
            anchor,
            color,
            related_question_id: None,
            note: None,
            created_at: now.clone(),
            updated_at: now,
            versions,
        }
    }

    #[must_use]
    pub fn with_related_question(mut self, question_id: impl Into<String>) -> Self {
        self.related_question_id = Some(question_id.into());
        self
    }

    /// Record a mutation made on `device_id`.
    pub fn touch(&mut self, device_id: &str) {
        self.versions.increment(device_id);
        self.updated_at = now_iso();
    }

    pub fn set_anchor(&mut self, anchor: Anchor, device_id: &str) {
        self.anchor = anchor;
        self.touch(device_id);
    }

    pub fn set_color(&mut self, color: HighlightColor, device_id: &str) {
        self.color = color;
        self.touch(device_id);
    }

    pub fn set_note(&mut self, content: impl Into<String>, device_id: &str) {
        self.touch(device_id);
        self.note = Some(HighlightNote {
            content: content.into(),
            updated_at: self.updated_at.clone(),
        });
    }

    pub fn clear_note(&mut self, device_id: &str) {
        self.note = None;
        self.touch(device_id);
    }

    /// Decide which copy's content wins when `self` (local) meets `remote`.
    ///
    /// The higher counter for the local device wins. On equal counters a copy
    /// whose versions strictly dominate wins, then the later `updated_at`,
    /// with ties kept local.
    pub fn merge_winner(&self, remote: &Self, local_device: &str) -> MergeSide {
        let local_counter = self.versions.get(local_device);
        let remote_counter = remote.versions.get(local_device);
        match local_counter.cmp(&remote_counter) {
            std::cmp::Ordering::Greater => MergeSide::Local,
            std::cmp::Ordering::Less => MergeSide::Remote,
            std::cmp::Ordering::Equal if remote.versions.dominates(&self.versions) => {
                MergeSide::Remote
            }
            std::cmp::Ordering::Equal if self.versions.dominates(&remote.versions) => {
                MergeSide::Local
            }
            std::cmp::Ordering::Equal if remote.updated_at > self.updated_at => MergeSide::Remote,
            std::cmp::Ordering::Equal => MergeSide::Local,
        }
    }

    /// Merge a remote copy of the same highlight into this local copy.
    #[must_use]
    pub fn merge(&self, remote: &Self, local_device: &str) -> Self {
        let mut merged = match self.merge_winner(remote, local_device) {
            MergeSide::Local => self.clone(),
            MergeSide::Remote => remote.clone(),
        };
        merged.id = self.id.clone();
        merged.user_id = self.user_id.clone();
        merged.material_id = self.material_id.clone();
        merged.versions = self.versions.merged(&remote.versions);
        merged.updated_at = self.updated_at.clone().max(remote.updated_at.clone());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextQuote;
    use pretty_assertions::assert_eq;

    fn anchor(text: &str) -> Anchor {
        Anchor {
            selector: "p".to_string(),
            start_offset: 0,
            end_offset: text.chars().count(),
            selected_text: text.to_string(),
            before_text: String::new(),
            after_text: String::new(),
            page_number: None,
            text_quote: Some(TextQuote {
                exact: text.to_string(),
                ..TextQuote::default()
            }),
        }
    }

    #[test]
    fn id_has_time_prefix_and_is_unique() {
        let first = HighlightId::new();
        let second = HighlightId::new();
        assert!(first.as_str().starts_with("hl_"));
        assert_ne!(first, second);
    }

    #[test]
    fn new_highlight_starts_at_version_one() {
        let highlight = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Green, "dev");
        assert_eq!(highlight.text, "deposit");
        assert_eq!(highlight.versions.get("dev"), 1);
        assert_eq!(highlight.created_at, highlight.updated_at);
    }

    #[test]
    fn note_edits_bump_local_counter() {
        let mut highlight = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Red, "dev");
        highlight.set_note("check limit", "dev");
        assert_eq!(highlight.versions.get("dev"), 2);
        assert_eq!(highlight.note.as_ref().unwrap().content, "check limit");
        highlight.clear_note("dev");
        assert!(highlight.note.is_none());
        assert_eq!(highlight.versions.get("dev"), 3);
    }

    #[test]
    fn color_parses_case_insensitively() {
        assert_eq!("Blue".parse::<HighlightColor>().unwrap(), HighlightColor::Blue);
        assert!("purple".parse::<HighlightColor>().is_err());
    }

    #[test]
    fn serializes_to_shared_record_shape() {
        let highlight = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Yellow, "dev")
            .with_related_question("q-7");
        let json = serde_json::to_value(&highlight).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["materialId"], "m1");
        assert_eq!(json["color"], "yellow");
        assert_eq!(json["relatedQuestionId"], "q-7");
        assert_eq!(json["versions"]["dev"], 1);
        assert!(json.get("note").is_none());

        let parsed: Highlight = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, highlight);
    }

    #[test]
    fn merge_keeps_local_counter_and_adopts_remote_devices() {
        let mut local = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Yellow, "deviceA");
        local.versions = VersionVector::from([("deviceA", 2)]);
        local.updated_at = "2024-03-01T10:00:00.000Z".to_string();
        local.set_note_unversioned("local note");

        let mut remote = local.clone();
        remote.versions = VersionVector::from([("deviceA", 1), ("deviceB", 3)]);
        remote.updated_at = "2024-03-02T09:00:00.000Z".to_string();
        remote.note = None;

        let merged = local.merge(&remote, "deviceA");
        assert_eq!(merged.versions.get("deviceA"), 2);
        assert_eq!(merged.versions.get("deviceB"), 3);
        assert_eq!(merged.updated_at, "2024-03-02T09:00:00.000Z");
        assert_eq!(merged.note.unwrap().content, "local note");
    }

    #[test]
    fn merge_tie_breaks_on_updated_at() {
        let mut local = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Yellow, "deviceA");
        local.updated_at = "2024-03-01T10:00:00.000Z".to_string();

        let mut remote = local.clone();
        remote.color = HighlightColor::Blue;
        remote.versions = VersionVector::from([("deviceA", 1), ("deviceB", 1)]);
        remote.updated_at = "2024-03-01T11:00:00.000Z".to_string();

        assert_eq!(local.merge_winner(&remote, "deviceA"), MergeSide::Remote);
        assert_eq!(local.merge(&remote, "deviceA").color, HighlightColor::Blue);
        assert_eq!(remote.merge_winner(&remote.clone(), "deviceA"), MergeSide::Local);
    }

    #[test]
    fn merge_prefers_dominating_copy_within_same_millisecond() {
        let local = Highlight::new("u1", "m1", anchor("deposit"), HighlightColor::Yellow, "phone");
        let mut remote = local.clone();
        remote.set_note_unversioned("phone note");
        remote.versions = VersionVector::from([("phone", 2)]);

        // Laptop has not edited; both copies share a timestamp
        assert_eq!(local.merge_winner(&remote, "laptop"), MergeSide::Remote);
        assert_eq!(
            local.merge(&remote, "laptop").note.unwrap().content,
            "phone note"
        );
        assert_eq!(remote.merge_winner(&local, "laptop"), MergeSide::Local);
    }

    impl Highlight {
        fn set_note_unversioned(&mut self, content: &str) {
            self.note = Some(HighlightNote {
                content: content.to_string(),
                updated_at: self.updated_at.clone(),
            });
        }
    }
}
