//! Highlight export helpers for CLI and app parity.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Highlight;

/// Export output format shared by all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

/// Render highlights as pretty-printed JSON in the stored record shape.
pub fn render_json_export(highlights: &[Highlight]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(highlights)
}

/// Render highlights as a Markdown study sheet, one section per material.
#[must_use]
pub fn render_markdown_export(highlights: &[Highlight]) -> String {
    let mut output = String::new();
    let mut current_material: Option<&str> = None;

    for highlight in highlights {
        if current_material != Some(highlight.material_id.as_str()) {
            if current_material.is_some() {
                output.push('\n');
            }
            let _ = writeln!(output, "## {}", highlight.material_id);
            current_material = Some(highlight.material_id.as_str());
        }

        let _ = writeln!(output);
        for line in highlight.text.lines() {
            let _ = writeln!(output, "> {line}");
        }
        let _ = writeln!(output);

        let mut details = vec![format!("color: {}", highlight.color)];
        if let Some(page) = highlight.anchor.page_number {
            details.push(format!("page {page}"));
        }
        if let Some(question) = &highlight.related_question_id {
            details.push(format!("question {question}"));
        }
        let _ = writeln!(output, "- {} ({})", highlight.id, details.join(", "));
        if let Some(note) = &highlight.note {
            let _ = writeln!(output, "- Note: {}", note.content);
        }
    }

    output
}

/// Render highlights based on selected export format.
pub fn render_highlights_export(
    highlights: &[Highlight],
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(highlights),
        ExportFormat::Markdown => Ok(render_markdown_export(highlights)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("margin-export-{timestamp_ms}.{}", format.extension())
}
