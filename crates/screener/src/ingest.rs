use crate::tui::Progress;
use colored::Colorize;
use futures::{stream, StreamExt};
use screener_spider::bulk::{self, BulkEntry};
use screener_spider::fetcher::HttpFetcher;
use screener_spider::{Config, Coordinator, IngestOutcome, IngestionState, IngestionStatus, Ticker};
use std::sync::Arc;
use tracing::{debug, info};

/// Ingest `tickers` and wait for every admitted run to finish.
pub(crate) async fn run(
    config: &Config,
    tickers: Vec<Ticker>,
    force: bool,
    tui: bool,
) -> anyhow::Result<()> {
    let time = std::time::Instant::now();

    let fetcher = Arc::new(HttpFetcher::new(config)?);
    let repository = crate::repository(config)?;
    let coordinator = Coordinator::new(config, fetcher, repository);

    let entries = bulk::ingest_many(&coordinator, tickers, force).await;
    let progress = Progress::new(entries.len(), tui)?;

    // wait on every ticker at once; each finishes in its own time
    let results: Vec<(&BulkEntry, Option<IngestionStatus>)> = stream::iter(&entries)
        .map(|entry| {
            let coordinator = &coordinator;
            let progress = &progress;
            async move {
                let status = match &entry.outcome {
                    IngestOutcome::Triggered { .. } | IngestOutcome::AlreadyInProgress { .. } => {
                        coordinator.wait(&entry.ticker).await
                    }
                    IngestOutcome::SkippedFresh { status } => Some(status.clone()),
                    IngestOutcome::Failed { .. } => None,
                };
                let ok = status
                    .as_ref()
                    .is_some_and(|s| s.state == IngestionState::Completed);
                progress.record(ok);
                debug!("[{}] settled, ok: {ok}", entry.ticker);
                (entry, status)
            }
        })
        .buffer_unordered(entries.len().max(1))
        .collect()
        .await;
    progress.finish();

    // summary, in input order
    let mut failed = 0;
    for entry in &entries {
        let status = results
            .iter()
            .find(|(e, _)| e.ticker == entry.ticker)
            .and_then(|(_, status)| status.as_ref());
        let line = summary_line(entry, status);
        if line.1 {
            println!("{}", line.0);
        } else {
            failed += 1;
            eprintln!("{}", line.0);
        }
    }

    info!(
        "ingested {}/{} tickers, {:.3}s",
        entries.len() - failed,
        entries.len(),
        time.elapsed().as_secs_f64()
    );
    if failed > 0 {
        anyhow::bail!("{failed} of {} tickers failed", entries.len());
    }

    Ok(())
}

fn summary_line(entry: &BulkEntry, status: Option<&IngestionStatus>) -> (String, bool) {
    let ticker = format!("{:<12}", entry.ticker.as_str()).bold();

    if let IngestOutcome::Failed { error } = &entry.outcome {
        return (format!("{ticker} {} {error}", "failed".red()), false);
    }
    let fresh = matches!(entry.outcome, IngestOutcome::SkippedFresh { .. });

    match status {
        Some(status) if status.state == IngestionState::Completed => {
            let label = if fresh {
                "fresh".cyan()
            } else {
                "ingested".green()
            };
            let at = status
                .finished_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            (format!("{ticker} {label} {at}"), true)
        }
        Some(status) => {
            let error = status.error.as_deref().unwrap_or("unknown error");
            (format!("{ticker} {} {error}", "failed".red()), false)
        }
        None => (format!("{ticker} {}", "lost".red()), false),
    }
}
