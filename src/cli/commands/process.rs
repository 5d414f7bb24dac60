//! Process command - run the pipeline stages for a video.

use crate::cli::{preflight, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the process command: metadata, then chunks, then enrichment.
pub async fn run_process(
    input: &str,
    metadata_only: bool,
    no_enrich: bool,
    settings: Settings,
) -> Result<()> {
    preflight::check(preflight::Operation::Process, &settings)?;

    let orchestrator = Arc::new(Orchestrator::new(settings)?);
    let cancel = cancel_on_ctrl_c();

    eprintln!("  Fetching metadata...");
    let resource = orchestrator.process_metadata(input).await?;
    Output::success(&format!("{} ({})", resource.title, resource.id));
    if let Some(creator) = &resource.creator {
        Output::kv("Channel", creator);
    }

    if metadata_only {
        return Ok(());
    }

    eprintln!("  Extracting subtitles and chunking...");
    let chunks = orchestrator.process_chunks(&resource.id, &cancel).await?;
    if chunks.chunk_count == 0 {
        Output::warning("No captions available; nothing to enrich.");
        return Ok(());
    }
    Output::success(&format!("Created {} chunks", chunks.chunk_count));

    if no_enrich {
        return Ok(());
    }

    let outcome = enrich_with_progress(
        &orchestrator,
        &resource.id,
        chunks.chunk_count as u64,
        true,
        &cancel,
    )
    .await?;
    Output::success(&format!("Enriched {} chunks", outcome));

    Ok(())
}

/// Run enrichment with a progress bar.
pub(super) async fn enrich_with_progress(
    orchestrator: &Arc<Orchestrator>,
    resource_id: &str,
    total: u64,
    force: bool,
    cancel: &CancellationToken,
) -> Result<usize> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} Enriching [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("█▓░"),
    );

    let progress = Arc::new(AtomicU64::new(0));
    let task = {
        let orchestrator = orchestrator.clone();
        let resource_id = resource_id.to_string();
        let cancel = cancel.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            orchestrator
                .process_enrichment(&resource_id, force, &cancel, Some(progress))
                .await
        })
    };

    while !task.is_finished() {
        pb.set_position(progress.load(Ordering::Relaxed));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    pb.finish_and_clear();

    let outcome = task.await??;
    Ok(outcome.chunks_attempted)
}

/// A token that flips when the user hits Ctrl-C.
pub(super) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            Output::warning("Cancelling... partial results are kept.");
            trigger.cancel();
        }
    });
    cancel
}
