use crate::commands::common::{
    normalize_highlight_identifier, open_stores, resolve_highlight, CliContext,
};
use crate::error::CliError;

pub async fn run_delete(ctx: &CliContext, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_highlight_identifier(id)?;
    let stores = open_stores(ctx)?;
    let highlight = resolve_highlight(&normalized_id, &stores, &ctx.user_id).await?;

    stores.shared.delete(&ctx.user_id, &highlight.id).await?;
    println!("{}", highlight.id);
    Ok(())
}
