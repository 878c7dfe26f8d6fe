use crate::commands::common::{open_synced_store, CliContext};
use crate::error::CliError;

pub async fn run_sync(ctx: &CliContext) -> Result<(), CliError> {
    let store = open_synced_store(ctx)?;
    let report = store.flush_outbox(&ctx.user_id).await?;

    if report.failed > 0 {
        tracing::warn!("{} queued changes could not be pushed", report.failed);
    }
    println!(
        "Sync completed: {} pushed, {} deleted, {} still queued",
        report.pushed, report.deleted, report.failed
    );
    Ok(())
}
