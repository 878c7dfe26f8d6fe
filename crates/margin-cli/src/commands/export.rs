use std::path::Path;

use margin_core::export::render_highlights_export;

use crate::cli::ExportFormat;
use crate::commands::common::{emit, list_highlights, open_stores, CliContext};
use crate::error::CliError;

pub async fn run_export(
    ctx: &CliContext,
    format: ExportFormat,
    material_id: Option<&str>,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let stores = open_stores(ctx)?;
    let highlights = list_highlights(&stores, &ctx.user_id, material_id).await?;
    let rendered = render_highlights_export(&highlights, format.into())?;
    emit(&rendered, output_path)
}
