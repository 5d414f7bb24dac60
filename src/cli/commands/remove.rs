//! Remove command - delete a resource and its stored data.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the remove command. Notes are decoupled and survive the deletion.
pub async fn run_remove(resource_id: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    if orchestrator.delete_resource(resource_id).await? {
        Output::success(&format!("Removed {} and its chunks", resource_id));
    } else {
        Output::warning(&format!("No resource with id {}", resource_id));
    }
    Ok(())
}
