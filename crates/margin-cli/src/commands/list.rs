use crate::commands::common::{
    format_highlight_lines, highlight_to_list_item, list_highlights, open_stores, CliContext,
    HighlightListItem,
};
use crate::error::CliError;

pub async fn run_list(
    ctx: &CliContext,
    material_id: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let stores = open_stores(ctx)?;
    let highlights = list_highlights(&stores, &ctx.user_id, material_id).await?;

    if as_json {
        let json_items = highlights
            .iter()
            .map(highlight_to_list_item)
            .collect::<Vec<HighlightListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_highlight_lines(&highlights) {
            println!("{line}");
        }
    }

    Ok(())
}
