use crate::coordinator::{Coordinator, IngestOutcome};
use crate::query::StatusView;
use crate::status::StatusTracker;
use crate::ticker::Ticker;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

/// How many admission checks run at once; admission only reads metadata, the pipelines
/// themselves are bounded by the coordinator.
const FANOUT: usize = 16;

#[derive(Clone, Debug, Serialize)]
pub struct BulkEntry {
    pub ticker: Ticker,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Drop repeated tickers, keeping the first occurrence.
pub fn dedupe(tickers: Vec<Ticker>) -> Vec<Ticker> {
    let mut seen = HashSet::with_capacity(tickers.len());
    tickers
        .into_iter()
        .filter(|ticker| seen.insert(ticker.clone()))
        .collect()
}

/// Ingest every ticker independently; outcomes come back in input order.
pub async fn ingest_many(
    coordinator: &Coordinator,
    tickers: Vec<Ticker>,
    force: bool,
) -> Vec<BulkEntry> {
    let time = std::time::Instant::now();
    let tickers = dedupe(tickers);
    let total = tickers.len();

    let entries: Vec<BulkEntry> = stream::iter(tickers)
        .map(|ticker| async move {
            let outcome = coordinator.ingest(&ticker, force).await;
            BulkEntry { ticker, outcome }
        })
        .buffered(FANOUT)
        .collect()
        .await;

    let triggered = entries
        .iter()
        .filter(|entry| entry.outcome.is_triggered())
        .count();
    info!(
        "bulk ingest dispatched {triggered}/{total} tickers, {}",
        crate::time_elapsed(time)
    );

    entries
}

/// Statuses for `tickers`, in order; unknown tickers are `not_started`.
pub fn status_many(tracker: &StatusTracker, tickers: &[Ticker]) -> Vec<StatusView> {
    tracker
        .get_many(tickers)
        .into_iter()
        .map(|(ticker, entry)| StatusView::from_entry(ticker, entry))
        .collect()
}
