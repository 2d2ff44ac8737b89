use crate::config::{Config, RetryPolicy};
use crate::error::{FetchError, IngestError};
use crate::fetcher::{fetch_with_retry, Fetcher, RawPage};
use crate::freshness::FreshnessPolicy;
use crate::repository::Repository;
use crate::snapshot::{DataScope, FundamentalsSnapshot, SectionCoverage};
use crate::status::{IngestionStatus, Phase, StatusTracker};
use crate::ticker::Ticker;
use crate::{derived, extract};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// What a call to [`Coordinator::ingest`] did.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// A new run was admitted and is running in the background.
    Triggered { status: IngestionStatus },

    /// Another run for the ticker is queued or in progress; poll its status.
    AlreadyInProgress { status: IngestionStatus },

    /// The stored snapshot is within its TTL; nothing was fetched.
    SkippedFresh { status: IngestionStatus },

    /// The stored metadata could not be read, so nothing was admitted.
    Failed { error: String },
}

impl IngestOutcome {
    pub fn status(&self) -> Option<&IngestionStatus> {
        match self {
            IngestOutcome::Triggered { status }
            | IngestOutcome::AlreadyInProgress { status }
            | IngestOutcome::SkippedFresh { status } => Some(status),
            IngestOutcome::Failed { .. } => None,
        }
    }

    /// Whether this call started a new run.
    pub fn is_triggered(&self) -> bool {
        matches!(self, IngestOutcome::Triggered { .. })
    }
}

/// Runs fetch -> extract -> persist for one ticker at a time, at most once concurrently per
/// ticker.
///
/// `ingest` only does admission control and returns; the pipeline itself runs on a spawned task
/// which reports solely through the [`StatusTracker`]. Background runs are bounded by a
/// semaphore of `max_concurrent` permits, so a large bulk request queues rather than flooding
/// upstream.
#[derive(Clone)]
pub struct Coordinator {
    fetcher: Arc<dyn Fetcher>,
    repository: Arc<dyn Repository>,
    tracker: Arc<StatusTracker>,
    permits: Arc<Semaphore>,
    freshness: FreshnessPolicy,
    retry: RetryPolicy,
    fetch_timeout: Duration,
}

impl Coordinator {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>, repository: Arc<dyn Repository>) -> Self {
        Self {
            fetcher,
            repository,
            tracker: Arc::new(StatusTracker::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            freshness: FreshnessPolicy::new(config.ttl),
            retry: config.retry,
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Admit an ingestion of `ticker` unless its data is fresh (and `force` is unset) or a run is
    /// already in flight.
    ///
    /// Returns [`IngestOutcome::Failed`] only when the stored metadata cannot be read.
    pub async fn ingest(&self, ticker: &Ticker, force: bool) -> IngestOutcome {
        // forced runs skip the metadata read, so an unreadable store cannot block them
        let metadata = if force {
            None
        } else {
            match self.repository.get_metadata(ticker).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!("failed to read snapshot metadata for [{ticker}], error({err})");
                    return IngestOutcome::Failed {
                        error: err.to_string(),
                    };
                }
            }
        };

        let last_ingested_at = metadata.map(|metadata| metadata.last_ingested_at);
        if !self
            .freshness
            .should_ingest(last_ingested_at, Utc::now(), force)
        {
            if let Some(last_ingested_at) = last_ingested_at {
                debug!("[{ticker}] ingested at {last_ingested_at}, still fresh");
                let status = self.tracker.observe_completed(ticker, last_ingested_at);
                return IngestOutcome::SkippedFresh { status };
            }
        }

        let admission = self.tracker.begin_if_absent_or_terminal(ticker);
        if !admission.accepted {
            debug!(
                "[{ticker}] already ingesting, attempt {}",
                admission.status.attempt
            );
            return IngestOutcome::AlreadyInProgress {
                status: admission.status,
            };
        }

        info!(
            "ingestion queued for [{ticker}], attempt {}, force: {force}",
            admission.status.attempt
        );
        let coordinator = self.clone();
        let background = ticker.clone();
        tokio::spawn(async move { coordinator.run(background).await });

        IngestOutcome::Triggered {
            status: admission.status,
        }
    }

    /// Resolve once the ticker's entry is terminal; `None` if the ticker was never ingested.
    pub async fn wait(&self, ticker: &Ticker) -> Option<IngestionStatus> {
        // subscribe before looking, so no transition slips between the two
        let mut events = self.tracker.subscribe();
        loop {
            match self.tracker.get(ticker) {
                None => return None,
                Some(status) if status.is_terminal() => return Some(status),
                Some(_) => {}
            }
            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return self.tracker.get(ticker),
            }
        }
    }

    // Every admitted run ends `completed` or `failed`, panics included.
    async fn run(self, ticker: Ticker) {
        let time = std::time::Instant::now();

        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                error!("no ingestion permit for [{ticker}], error({err})");
                self.tracker.fail(&ticker, format!("ingestion pool closed: {err}"));
                return;
            }
        };
        self.tracker.start(&ticker);

        match AssertUnwindSafe(self.pipeline(&ticker)).catch_unwind().await {
            Ok(Ok(coverage)) => {
                self.tracker.complete(&ticker, coverage);
                info!(
                    "ingestion complete for [{ticker}], {}",
                    crate::time_elapsed(time)
                );
            }
            Ok(Err(err)) => {
                error!("ingestion failed for [{ticker}], error({err})");
                self.tracker.fail(&ticker, err.to_string());
            }
            Err(_) => {
                let err = IngestError::Aborted("pipeline panicked".to_string());
                error!("ingestion failed for [{ticker}], error({err})");
                self.tracker.fail(&ticker, err.to_string());
            }
        }
    }

    async fn pipeline(&self, ticker: &Ticker) -> Result<SectionCoverage, IngestError> {
        // 1. fetch
        let page = self.fetch_page(ticker).await?;
        self.tracker.advance(ticker, Phase::Fetch);

        // 2. extract
        let html = page.html.clone();
        let sections = tokio::task::spawn_blocking(move || extract::parse(&html))
            .await
            .map_err(|err| IngestError::Aborted(format!("parser task failed: {err}")))??;
        self.tracker.advance(ticker, Phase::Parse);

        // 3. persist snapshot and page, as one replace
        let snapshot = FundamentalsSnapshot {
            ticker: ticker.clone(),
            scope: page.scope,
            derived: derived::compute(&sections),
            sections,
            last_ingested_at: Utc::now(),
            source_version: page.source_version(),
        };
        self.repository.put_snapshot(&snapshot, &page).await?;
        self.tracker.advance(ticker, Phase::Persist);

        Ok(snapshot.coverage())
    }

    /// The consolidated page, or the standalone one when the consolidated page has no annual
    /// figures.
    async fn fetch_page(&self, ticker: &Ticker) -> Result<RawPage, FetchError> {
        let page = fetch_with_retry(
            self.fetcher.as_ref(),
            ticker,
            DataScope::Consolidated,
            self.retry,
            self.fetch_timeout,
        )
        .await?;

        if extract::has_annual_data(&page.html) {
            debug!("[{ticker}] data scope: consolidated");
            return Ok(page);
        }

        warn!("[{ticker}] consolidated page has no usable annual data, falling back to standalone");
        fetch_with_retry(
            self.fetcher.as_ref(),
            ticker,
            DataScope::Standalone,
            self.retry,
            self.fetch_timeout,
        )
        .await
    }
}
