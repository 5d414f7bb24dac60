//! Enrich command - enrich stored chunks of one resource.

use super::process::{cancel_on_ctrl_c, enrich_with_progress};
use crate::cli::{preflight, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::sync::Arc;

/// Run the enrich command.
pub async fn run_enrich(resource_id: &str, force: bool, settings: Settings) -> Result<()> {
    preflight::check(preflight::Operation::Enrich, &settings)?;

    let orchestrator = Arc::new(Orchestrator::new(settings)?);
    let total = orchestrator.store().count_chunks(resource_id)? as u64;
    if total == 0 {
        Output::info("No chunks stored for this resource. Run 'notat process' first.");
        return Ok(());
    }

    let cancel = cancel_on_ctrl_c();
    let attempted =
        enrich_with_progress(&orchestrator, resource_id, total, force, &cancel).await?;

    if attempted == 0 {
        Output::info("All chunks are already enriched. Use --force to re-run them.");
    } else {
        Output::success(&format!("Enriched {} chunks", attempted));
    }
    Ok(())
}
