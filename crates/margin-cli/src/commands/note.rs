use crate::commands::common::{
    normalize_highlight_identifier, open_stores, resolve_highlight, resolve_note_content,
    CliContext,
};
use crate::error::CliError;

pub async fn run_note(
    ctx: &CliContext,
    id: &str,
    content_parts: &[String],
    clear: bool,
) -> Result<(), CliError> {
    let normalized_id = normalize_highlight_identifier(id)?;
    let stores = open_stores(ctx)?;
    let highlight = resolve_highlight(&normalized_id, &stores, &ctx.user_id).await?;

    if clear {
        let updated = stores.shared.delete_note(&highlight.id).await?;
        println!("{}", updated.id);
        return Ok(());
    }

    let current = highlight
        .note
        .as_ref()
        .map_or("", |note| note.content.as_str());
    let content = resolve_note_content(content_parts, current)?;
    if content == current {
        println!("{}", highlight.id);
        return Ok(());
    }

    let updated = stores.shared.save_note(&highlight.id, &content).await?;
    println!("{}", updated.id);
    Ok(())
}
