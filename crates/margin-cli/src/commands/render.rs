use std::path::Path;
use std::sync::Arc;

use margin_core::anchor::{heal_channel, HealWorker};
use margin_core::render::{
    OverlayRenderer, RenderReport, RenderSession, RenderStrategy, SpanBoxLayout,
};

use crate::commands::common::{emit, load_source, open_stores, CliContext};
use crate::error::CliError;

pub async fn run_render(
    ctx: &CliContext,
    material_id: &str,
    source_path: &Path,
    strategy: Option<RenderStrategy>,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let (rendered, report) = render_material(ctx, material_id, source_path, strategy).await?;
    emit(&rendered, output_path)?;
    eprintln!(
        "{} rendered, {} unrenderable, {} healed",
        report.rendered.len(),
        report.unrenderable.len(),
        report.healed.len()
    );
    Ok(())
}

/// Paint the stored highlights of `material_id` over `source_path` and persist
/// any anchors that had to be relocated.
pub async fn render_material(
    ctx: &CliContext,
    material_id: &str,
    source_path: &Path,
    strategy: Option<RenderStrategy>,
) -> Result<(String, RenderReport), CliError> {
    let source = load_source(source_path)?;
    let stores = open_stores(ctx)?;
    let highlights = stores
        .shared
        .get_for_material(&ctx.user_id, material_id)
        .await?;

    let (sender, receiver) = heal_channel();
    let mut session = RenderSession::from_config(&ctx.config).with_heal_queue(sender);
    session.load_material(material_id);
    let mut worker = HealWorker::new(Arc::clone(&stores.shared), session.epoch(), receiver);

    let strategy = strategy.unwrap_or(if source.text_layer {
        RenderStrategy::Overlay
    } else {
        RenderStrategy::Wrap
    });
    let mut doc = source.document;
    let root = doc.root();
    let (rendered, report) = match strategy {
        RenderStrategy::Wrap => {
            let report = session.render_wrapped(&mut doc, root, &highlights);
            (doc.inner_html(root), report)
        }
        RenderStrategy::Overlay => {
            let renderer = OverlayRenderer::new(SpanBoxLayout);
            let (layer, report) = session.render_overlay(&doc, root, &highlights, &renderer);
            (format!("{}\n{}", doc.outer_html(root), layer.to_html()), report)
        }
    };

    let healed = worker.drain().await;
    tracing::info!(
        "Rendered {} of {} highlights on {material_id} ({strategy}); healed {healed}",
        report.rendered.len(),
        highlights.len()
    );
    Ok((rendered, report))
}
