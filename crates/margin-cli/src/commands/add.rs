use std::path::Path;

use margin_core::anchor::{AnchorBuilder, TextIndex};
use margin_core::util::{char_len, normalize_text_option};
use margin_core::{Highlight, HighlightColor};

use crate::commands::common::{load_source, open_stores, CliContext};
use crate::error::CliError;

/// A passage to highlight, as given on the command line.
pub struct AddRequest<'a> {
    pub material_id: &'a str,
    pub source: &'a Path,
    pub quote_parts: &'a [String],
    /// 1-based occurrence of the quote in the source text
    pub occurrence: usize,
    pub color: HighlightColor,
    pub question_id: Option<&'a str>,
    pub note: Option<&'a str>,
}

pub async fn run_add(ctx: &CliContext, request: &AddRequest<'_>) -> Result<(), CliError> {
    let highlight = create_highlight(ctx, request).await?;
    println!("{}", highlight.id);
    Ok(())
}

pub async fn create_highlight(
    ctx: &CliContext,
    request: &AddRequest<'_>,
) -> Result<Highlight, CliError> {
    let quote = normalize_text_option(Some(request.quote_parts.join(" ")))
        .ok_or(CliError::EmptyQuote)?;
    let source = load_source(request.source)?;
    let doc = &source.document;
    let root = doc.root();

    let not_found = || CliError::QuoteNotFound {
        quote: quote.clone(),
        occurrence: request.occurrence,
    };
    let index = TextIndex::build(doc, root);
    let start = *index
        .find_all(&quote, 0, index.len())
        .get(request.occurrence.max(1) - 1)
        .ok_or_else(not_found)?;
    let range = index
        .range(start, start + char_len(&quote))
        .ok_or_else(not_found)?;

    let builder = AnchorBuilder::new(ctx.config.context_chars, ctx.config.min_selection_chars);
    let anchor = builder
        .build(doc, root, &range)
        .ok_or(CliError::Unanchorable)?;

    let stores = open_stores(ctx)?;
    let mut highlight = Highlight::new(
        ctx.user_id.clone(),
        request.material_id,
        anchor,
        request.color,
        stores.local.device_id(),
    );
    if let Some(question_id) = request.question_id {
        highlight = highlight.with_related_question(question_id);
    }

    let mut saved = stores.shared.save(&highlight).await?;
    if let Some(note) = normalize_text_option(request.note.map(str::to_string)) {
        saved = stores.shared.save_note(&saved.id, &note).await?;
    }
    tracing::debug!("Anchored {} at {}", saved.id, saved.anchor.selector);
    Ok(saved)
}
