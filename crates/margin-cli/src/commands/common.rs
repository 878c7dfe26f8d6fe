use std::env;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use margin_core::config::MarginConfig;
use margin_core::device::FileDeviceIdProvider;
use margin_core::document::{Document, TextLayerPage};
use margin_core::store::{HighlightStore, HttpRemoteStore, LocalHighlightStore, SyncedHighlightStore};
use margin_core::util::{char_len, char_slice, collapse_whitespace, normalize_text_option};
use margin_core::{Highlight, HighlightId};
use serde::Serialize;

use crate::error::CliError;

pub const USER_ENV: &str = "MARGIN_USER";
pub const DB_PATH_ENV: &str = "MARGIN_DB_PATH";
const DEFAULT_USER: &str = "local";

/// Settings every command runs with, resolved once from flags, env, and config.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: MarginConfig,
    pub user_id: String,
    pub db_path: PathBuf,
}

impl CliContext {
    pub fn resolve(
        config_path: Option<&Path>,
        cli_db_path: Option<PathBuf>,
        cli_user: Option<String>,
    ) -> Result<Self, CliError> {
        let config_path = config_path.map_or_else(default_config_path, |path| Ok(path.to_path_buf()))?;
        let config = MarginConfig::load(&config_path)?;
        let db_path = resolve_db_path(cli_db_path, &config)?;
        Ok(Self {
            config,
            user_id: resolve_user(cli_user),
            db_path,
        })
    }

    /// Device id lives next to the database so each replica keeps its own.
    pub fn device_id_path(&self) -> PathBuf {
        self.db_path.with_file_name("device_id")
    }
}

/// Local store plus the store commands should write through.
pub struct Stores {
    pub local: LocalHighlightStore,
    pub shared: Arc<dyn HighlightStore>,
}

#[derive(Debug, Serialize)]
pub struct HighlightListItem {
    pub id: String,
    pub material_id: String,
    pub color: String,
    pub preview: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub updated_at: String,
    pub relative_time: String,
}

/// A parsed source file and whether it was a positioned text layer.
pub struct LoadedSource {
    pub document: Document,
    pub text_layer: bool,
}

pub fn resolve_user(cli_user: Option<String>) -> String {
    cli_user
        .or_else(|| env::var(USER_ENV).ok())
        .and_then(|user| normalize_text_option(Some(user)))
        .unwrap_or_else(|| DEFAULT_USER.to_string())
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &MarginConfig,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    Ok(data_dir(config)?.join("margin.db"))
}

fn data_dir(config: &MarginConfig) -> Result<PathBuf, CliError> {
    config
        .data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("margin")))
        .ok_or(CliError::NoDataDir)
}

fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("margin").join("config.json"))
        .ok_or_else(|| {
            CliError::Core(margin_core::Error::Config(
                "no config directory; pass --config".to_string(),
            ))
        })
}

pub fn open_local_store(ctx: &CliContext) -> Result<LocalHighlightStore, CliError> {
    let device = FileDeviceIdProvider::load_or_create(ctx.device_id_path())?;
    Ok(LocalHighlightStore::open(ctx.db_path.clone(), Arc::new(device))?)
}

pub fn open_synced_store(
    ctx: &CliContext,
) -> Result<SyncedHighlightStore<HttpRemoteStore>, CliError> {
    let Some(endpoint) = ctx.config.sync_endpoint.as_deref() else {
        return Err(CliError::SyncNotConfigured);
    };
    let remote = HttpRemoteStore::new(endpoint, ctx.config.sync_timeout())?;
    Ok(
        SyncedHighlightStore::new(open_local_store(ctx)?, Arc::new(remote))
            .with_poll_interval(ctx.config.sync_poll_interval()),
    )
}

/// Open the store for `ctx`, writing through to the remote when sync is configured.
pub fn open_stores(ctx: &CliContext) -> Result<Stores, CliError> {
    if let Some(endpoint) = &ctx.config.sync_endpoint {
        let synced = open_synced_store(ctx)?;
        tracing::debug!("Writing through to {endpoint}");
        return Ok(Stores {
            local: synced.local().clone(),
            shared: Arc::new(synced),
        });
    }

    let local = open_local_store(ctx)?;
    Ok(Stores {
        shared: Arc::new(local.clone()),
        local,
    })
}

/// Highlights of the current user, optionally limited to one material.
pub async fn list_highlights(
    stores: &Stores,
    user_id: &str,
    material_id: Option<&str>,
) -> Result<Vec<Highlight>, CliError> {
    match material_id {
        Some(material_id) => Ok(stores.shared.get_for_material(user_id, material_id).await?),
        None => Ok(stores.local.list_for_user(user_id).await?),
    }
}

/// Read an HTML file, or a text layer when the file is JSON.
pub fn load_source(path: &Path) -> Result<LoadedSource, CliError> {
    let payload = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    if is_json {
        let pages: Vec<TextLayerPage> = serde_json::from_str(&payload)?;
        Ok(LoadedSource {
            document: Document::from_text_layer(&pages),
            text_layer: true,
        })
    } else {
        Ok(LoadedSource {
            document: Document::from_html(&payload),
            text_layer: false,
        })
    }
}

pub async fn resolve_highlight(
    query: &str,
    stores: &Stores,
    user_id: &str,
) -> Result<Highlight, CliError> {
    if let Some(highlight) = stores.local.get(&HighlightId::from(query)).await? {
        if highlight.user_id == user_id {
            return Ok(highlight);
        }
    }

    let mut matching = stores
        .local
        .list_for_user(user_id)
        .await?
        .into_iter()
        .filter(|highlight| highlight.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::HighlightNotFound(query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|highlight| highlight.id.to_string())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousHighlightId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_highlight_lines(highlights: &[Highlight]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    highlights
        .iter()
        .map(|highlight| {
            let preview = quote_preview(&highlight.text, 40);
            let relative_time = format_relative_time(&highlight.updated_at, now_ms);
            let marker = if highlight.note.is_some() { "  [note]" } else { "" };
            format!(
                "{}  {:<6}  {preview:<40}  {relative_time}{marker}",
                highlight.id,
                highlight.color.as_str()
            )
        })
        .collect()
}

pub fn highlight_to_list_item(highlight: &Highlight) -> HighlightListItem {
    let now_ms = Utc::now().timestamp_millis();
    HighlightListItem {
        id: highlight.id.to_string(),
        material_id: highlight.material_id.clone(),
        color: highlight.color.to_string(),
        preview: quote_preview(&highlight.text, 80),
        text: highlight.text.clone(),
        page: highlight.anchor.page_number,
        question_id: highlight.related_question_id.clone(),
        note: highlight.note.as_ref().map(|note| note.content.clone()),
        updated_at: highlight.updated_at.clone(),
        relative_time: format_relative_time(&highlight.updated_at, now_ms),
    }
}

/// Single-line preview of a quote, cut to `max_chars` with an ellipsis.
pub fn quote_preview(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if char_len(&collapsed) <= max_chars {
        return collapsed;
    }
    format!("{}...", char_slice(&collapsed, 0, max_chars.saturating_sub(3)))
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Largest unit first.
const RELATIVE_UNITS: [(i64, &str); 6] = [
    (365 * DAY_MS, "y"),
    (30 * DAY_MS, "mo"),
    (7 * DAY_MS, "w"),
    (DAY_MS, "d"),
    (HOUR_MS, "h"),
    (MINUTE_MS, "m"),
];

/// Age of an ISO timestamp relative to `now_ms`; unparseable input is echoed back.
pub fn format_relative_time(timestamp: &str, now_ms: i64) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let elapsed = now_ms.saturating_sub(parsed.timestamp_millis());
    RELATIVE_UNITS
        .iter()
        .find(|(unit, _)| elapsed >= *unit)
        .map_or_else(
            || "just now".to_string(),
            |(unit, suffix)| format!("{}{suffix} ago", elapsed / unit),
        )
}

pub fn resolve_note_content(content_parts: &[String], initial: &str) -> Result<String, CliError> {
    if let Some(content) = normalize_text_option(Some(content_parts.join(" "))) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial(initial)? {
        return Ok(content);
    }

    Err(CliError::EmptyNote)
}

pub fn normalize_highlight_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyHighlightId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Note text piped on stdin; `None` when stdin is a terminal or blank.
pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    Ok(normalize_text_option(Some(io::read_to_string(stdin.lock())?)))
}

/// Open the editor on a temp file seeded with `initial_content` and return
/// what was saved.
pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launched = launch_editor(&editor, &temp_file);
    let saved = std::fs::read_to_string(&temp_file);
    let _ = std::fs::remove_file(&temp_file);

    launched?;
    Ok(normalize_text_option(Some(saved?)))
}

/// Run `editor` on `file_path`. Commands such as `code --wait` are split on
/// whitespace when no program by the full name exists.
pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let status = match Command::new(editor).arg(file_path).status() {
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| CliError::EditorFailed("empty EDITOR command".into()))?;
            Command::new(program).args(parts).arg(file_path).status()?
        }
        result => result?,
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

/// `$VISUAL`, then `$EDITOR`, ignoring blank values.
pub fn preferred_editor() -> String {
    ["VISUAL", "EDITOR"]
        .into_iter()
        .find_map(|key| normalize_text_option(env::var(key).ok()))
        .unwrap_or_else(|| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("margin-note-{}-{now}.md", std::process::id()))
}

/// Write `rendered` to `output_path`, or stdout when none is given.
pub fn emit(rendered: &str, output_path: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}
