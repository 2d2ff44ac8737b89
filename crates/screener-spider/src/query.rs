use crate::coordinator::{Coordinator, IngestOutcome};
use crate::error::PersistenceError;
use crate::snapshot::{FundamentalsSnapshot, SectionCoverage};
use crate::status::{IngestionState, IngestionStatus, Phase, StatusTracker};
use crate::ticker::Ticker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Answer to a fundamentals request.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundamentalsView {
    /// Fresh data, served from the repository.
    Ready {
        snapshot: Box<FundamentalsSnapshot>,
        ingestion: IngestionStatus,
    },

    /// A run was triggered or is already running; poll the status endpoint.
    Ingesting { ingestion: IngestionStatus },
}

/// Fresh data for `ticker`, or the status of the ingestion that will produce it.
pub async fn fundamentals(
    coordinator: &Coordinator,
    ticker: &Ticker,
    force: bool,
) -> Result<FundamentalsView, PersistenceError> {
    let ingestion = match coordinator.ingest(ticker, force).await {
        IngestOutcome::SkippedFresh { status } => status,
        IngestOutcome::Triggered { status } | IngestOutcome::AlreadyInProgress { status } => {
            return Ok(FundamentalsView::Ingesting { ingestion: status });
        }
        IngestOutcome::Failed { error } => return Err(PersistenceError::ReadFailed(error)),
    };

    match coordinator.repository().get_snapshot(ticker).await? {
        Some(snapshot) => Ok(FundamentalsView::Ready {
            snapshot: Box::new(snapshot),
            ingestion,
        }),
        None => {
            // metadata was there a moment ago; the row went away under us
            warn!("snapshot for [{ticker}] vanished after freshness check, re-ingesting");
            match coordinator.ingest(ticker, true).await {
                IngestOutcome::Failed { error } => Err(PersistenceError::ReadFailed(error)),
                outcome => {
                    let ingestion = outcome.status().cloned().unwrap_or(ingestion);
                    Ok(FundamentalsView::Ingesting { ingestion })
                }
            }
        }
    }
}

/// Reported state, including the ticker that was never ingested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedState {
    NotStarted,
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl From<IngestionState> for ReportedState {
    fn from(state: IngestionState) -> Self {
        match state {
            IngestionState::Queued => ReportedState::Queued,
            IngestionState::InProgress => ReportedState::InProgress,
            IngestionState::Completed => ReportedState::Completed,
            IngestionState::Failed => ReportedState::Failed,
        }
    }
}

/// Status as served to consumers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusView {
    pub ticker: Ticker,
    pub state: ReportedState,
    pub progress_pct: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<SectionCoverage>,
}

impl StatusView {
    pub fn not_started(ticker: Ticker) -> Self {
        Self {
            ticker,
            state: ReportedState::NotStarted,
            progress_pct: 0,
            attempt: None,
            started_at: None,
            finished_at: None,
            error: None,
            progress: None,
            sections: None,
        }
    }

    pub fn from_entry(ticker: Ticker, entry: Option<IngestionStatus>) -> Self {
        let Some(status) = entry else {
            return Self::not_started(ticker);
        };
        Self {
            progress_pct: status.progress_pct(),
            state: status.state.into(),
            attempt: Some(status.attempt),
            started_at: Some(status.started_at),
            finished_at: status.finished_at,
            error: status.error,
            progress: status.progress,
            sections: status.sections,
            ticker,
        }
    }
}

pub fn status(tracker: &StatusTracker, ticker: &Ticker) -> StatusView {
    let view = StatusView::from_entry(ticker.clone(), tracker.get(ticker));
    debug!("status of [{ticker}]: {:?}", view.state);
    view
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ticker_is_not_started() {
        let tracker = StatusTracker::new();
        let ticker = Ticker::parse("ZZZFAKE").unwrap();

        let view = status(&tracker, &ticker);
        assert_eq!(view.state, ReportedState::NotStarted);
        assert_eq!(view.progress_pct, 0);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "not_started");
        assert!(json.get("attempt").is_none());
    }

    #[test]
    fn tracked_ticker_reports_its_entry() {
        let tracker = StatusTracker::new();
        let ticker = Ticker::parse("suzlon").unwrap();
        tracker.begin_if_absent_or_terminal(&ticker);
        tracker.start(&ticker);
        tracker.fail(&ticker, "no company page found");

        let view = status(&tracker, &ticker);
        assert_eq!(view.state, ReportedState::Failed);
        assert_eq!(view.error.as_deref(), Some("no company page found"));
        assert!(view.finished_at.is_some());
    }
}
