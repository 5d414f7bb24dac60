//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::store::ResourceFilter;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let store = orchestrator.store();

    let resources = store.list_resources(&ResourceFilter::default())?;
    if resources.is_empty() {
        Output::info("Nothing ingested yet. Use 'notat process <input>' to add a video.");
        return Ok(());
    }

    Output::header(&format!("Resources ({})", resources.len()));
    println!();

    let mut total_chunks = 0i64;
    for resource in &resources {
        let chunks = store.count_chunks(&resource.id)?;
        total_chunks += chunks;
        Output::resource_info(
            &resource.title,
            &resource.id,
            resource.kind.as_str(),
            chunks,
        );
    }

    println!();
    Output::kv("Total resources", &resources.len().to_string());
    Output::kv("Total chunks", &total_chunks.to_string());

    Ok(())
}
