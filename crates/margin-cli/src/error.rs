use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] margin_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No text to highlight provided")]
    EmptyQuote,
    #[error("No note content provided")]
    EmptyNote,
    #[error("Highlight ID cannot be empty")]
    EmptyHighlightId,
    #[error("'{quote}' does not occur {occurrence} time(s) in the source")]
    QuoteNotFound { quote: String, occurrence: usize },
    #[error("Selection is too short or empty to anchor")]
    Unanchorable,
    #[error("Highlight not found for id/prefix: {0}")]
    HighlightNotFound(String),
    #[error("{0}")]
    AmbiguousHighlightId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Could not resolve a data directory; pass --db-path or set MARGIN_DATA_DIR")]
    NoDataDir,
    #[error("Sync is not configured. Set `sync_endpoint` in the config file or MARGIN_SYNC_ENDPOINT.")]
    SyncNotConfigured,
}
