use crate::snapshot::SectionCoverage;
use crate::ticker::Ticker;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{trace, warn};

const EVENT_CAPACITY: usize = 1024;

/// `absent -> queued -> in_progress -> {completed | failed}`; a terminal entry may be re-queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl IngestionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionState::Completed | IngestionState::Failed)
    }
}

/// Pipeline phases, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Fetch,
    Parse,
    Persist,
}

impl Phase {
    pub fn ordinal(&self) -> u8 {
        match self {
            Phase::Fetch => 1,
            Phase::Parse => 2,
            Phase::Persist => 3,
        }
    }
}

/// The tracker's record of the latest ingestion attempt for one ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub ticker: Ticker,
    /// Identifies the run that owns this entry; every admission gets a new one.
    pub attempt: u64,
    pub state: IngestionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only in the `failed` state.
    pub error: Option<String>,
    /// Last phase that finished.
    pub progress: Option<Phase>,
    /// Which sections the run produced; set on completion.
    pub sections: Option<SectionCoverage>,
}

impl IngestionStatus {
    fn queued(ticker: Ticker, attempt: u64) -> Self {
        Self {
            ticker,
            attempt,
            state: IngestionState::Queued,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            progress: None,
            sections: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn progress_pct(&self) -> u8 {
        match self.state {
            IngestionState::Completed => 100,
            _ => self
                .progress
                .map_or(0, |phase| (u16::from(phase.ordinal()) * 100 / 3) as u8),
        }
    }
}

/// Result of admission control.
#[derive(Clone, Debug)]
pub struct Admission {
    pub accepted: bool,
    /// The new `queued` entry when accepted, otherwise the in-flight one.
    pub status: IngestionStatus,
}

/// Process-wide registry of ticker -> [`IngestionStatus`].
///
/// Entries live in a sharded map, so tickers on different shards never contend. Entries are
/// never removed. Every transition is published to [`StatusTracker::subscribe`] receivers.
#[derive(Debug)]
pub struct StatusTracker {
    entries: DashMap<Ticker, IngestionStatus>,
    next_attempt: AtomicU64,
    events: broadcast::Sender<IngestionStatus>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: DashMap::new(),
            next_attempt: AtomicU64::new(1),
            events,
        }
    }

    pub fn get(&self, ticker: &Ticker) -> Option<IngestionStatus> {
        self.entries.get(ticker).map(|entry| entry.value().clone())
    }

    /// Statuses for `tickers`, in the given order.
    pub fn get_many(&self, tickers: &[Ticker]) -> Vec<(Ticker, Option<IngestionStatus>)> {
        tickers
            .iter()
            .map(|ticker| (ticker.clone(), self.get(ticker)))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IngestionStatus> {
        self.events.subscribe()
    }

    /// The admission check: when `ticker` has no entry, or its entry is terminal, install a new
    /// `queued` entry and accept; otherwise reject with the in-flight entry.
    ///
    /// The check and the write happen under the entry's shard lock.
    pub fn begin_if_absent_or_terminal(&self, ticker: &Ticker) -> Admission {
        let status = match self.entries.entry(ticker.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_terminal() {
                    return Admission {
                        accepted: false,
                        status: entry.get().clone(),
                    };
                }
                let status = IngestionStatus::queued(ticker.clone(), self.next_attempt());
                entry.insert(status.clone());
                status
            }
            Entry::Vacant(entry) => {
                let status = IngestionStatus::queued(ticker.clone(), self.next_attempt());
                entry.insert(status.clone());
                status
            }
        };

        self.publish(&status);
        Admission {
            accepted: true,
            status,
        }
    }

    /// The `completed` status reported for fresh stored data, without running the pipeline.
    ///
    /// A `completed` entry is returned as is; an absent one is filled with a `completed` entry
    /// dated at the snapshot's ingestion time. A `failed` or in-flight entry is left in place
    /// and a `completed` status is built from `last_ingested_at` instead.
    pub fn observe_completed(
        &self,
        ticker: &Ticker,
        last_ingested_at: DateTime<Utc>,
    ) -> IngestionStatus {
        match self.entries.entry(ticker.clone()) {
            Entry::Occupied(entry) if entry.get().state == IngestionState::Completed => {
                entry.get().clone()
            }
            Entry::Occupied(_) => self.completed_at(ticker, last_ingested_at),
            Entry::Vacant(entry) => {
                let status = self.completed_at(ticker, last_ingested_at);
                entry.insert(status.clone());
                status
            }
        }
    }

    fn completed_at(&self, ticker: &Ticker, last_ingested_at: DateTime<Utc>) -> IngestionStatus {
        IngestionStatus {
            ticker: ticker.clone(),
            attempt: self.next_attempt(),
            state: IngestionState::Completed,
            started_at: last_ingested_at,
            finished_at: Some(last_ingested_at),
            error: None,
            progress: Some(Phase::Persist),
            sections: None,
        }
    }

    /// `queued -> in_progress`, once the run holds a concurrency permit.
    pub fn start(&self, ticker: &Ticker) -> Option<IngestionStatus> {
        self.transition(ticker, &[IngestionState::Queued], |status| {
            status.state = IngestionState::InProgress;
        })
    }

    pub fn advance(&self, ticker: &Ticker, phase: Phase) -> Option<IngestionStatus> {
        self.transition(ticker, &[IngestionState::InProgress], |status| {
            status.progress = Some(phase);
        })
    }

    pub fn complete(&self, ticker: &Ticker, sections: SectionCoverage) -> Option<IngestionStatus> {
        self.transition(ticker, &[IngestionState::InProgress], |status| {
            status.state = IngestionState::Completed;
            status.finished_at = Some(Utc::now());
            status.error = None;
            status.progress = Some(Phase::Persist);
            status.sections = Some(sections);
        })
    }

    pub fn fail(&self, ticker: &Ticker, error: impl Into<String>) -> Option<IngestionStatus> {
        let error = error.into();
        self.transition(
            ticker,
            &[IngestionState::Queued, IngestionState::InProgress],
            |status| {
                status.state = IngestionState::Failed;
                status.finished_at = Some(Utc::now());
                status.error = Some(error);
            },
        )
    }

    fn transition<F>(
        &self,
        ticker: &Ticker,
        from: &[IngestionState],
        apply: F,
    ) -> Option<IngestionStatus>
    where
        F: FnOnce(&mut IngestionStatus),
    {
        let updated = {
            let Some(mut entry) = self.entries.get_mut(ticker) else {
                warn!("status transition for [{ticker}] ignored, no entry");
                return None;
            };
            if !from.contains(&entry.state) {
                warn!(
                    "status transition for [{ticker}] ignored, entry is {:?}",
                    entry.state
                );
                return None;
            }
            apply(entry.value_mut());
            entry.value().clone()
        };

        self.publish(&updated);
        Some(updated)
    }

    fn publish(&self, status: &IngestionStatus) {
        trace!(
            "[{}] attempt {} is {:?}",
            status.ticker,
            status.attempt,
            status.state
        );
        // no receivers is fine
        let _ = self.events.send(status.clone());
    }

    fn next_attempt(&self) -> u64 {
        self.next_attempt.fetch_add(1, Ordering::Relaxed)
    }
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn second_admission_is_rejected_until_terminal() {
        let tracker = StatusTracker::new();
        let tcs = ticker("TCS");

        let first = tracker.begin_if_absent_or_terminal(&tcs);
        assert!(first.accepted);
        assert_eq!(first.status.state, IngestionState::Queued);

        let second = tracker.begin_if_absent_or_terminal(&tcs);
        assert!(!second.accepted);
        assert_eq!(second.status.attempt, first.status.attempt);

        tracker.start(&tcs).unwrap();
        tracker.fail(&tcs, "boom").unwrap();

        let third = tracker.begin_if_absent_or_terminal(&tcs);
        assert!(third.accepted);
        assert_ne!(third.status.attempt, first.status.attempt);
        assert_eq!(third.status.error, None);
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        let tracker = StatusTracker::new();
        let infy = ticker("INFY");

        assert!(tracker.start(&infy).is_none());
        tracker.begin_if_absent_or_terminal(&infy);

        // not yet in progress
        assert!(tracker.advance(&infy, Phase::Fetch).is_none());
        assert!(tracker.complete(&infy, SectionCoverage::default()).is_none());

        tracker.start(&infy).unwrap();
        let status = tracker.advance(&infy, Phase::Parse).unwrap();
        assert_eq!(status.progress_pct(), 66);

        let done = tracker.complete(&infy, SectionCoverage::default()).unwrap();
        assert_eq!(done.state, IngestionState::Completed);
        assert_eq!(done.progress_pct(), 100);
        assert!(done.finished_at.is_some());

        // terminal entries stay put
        assert!(tracker.fail(&infy, "late").is_none());
        assert_eq!(tracker.get(&infy).unwrap().state, IngestionState::Completed);
    }

    #[test]
    fn observe_completed_keeps_existing_entries() {
        let tracker = StatusTracker::new();
        let wipro = ticker("WIPRO");
        let at = Utc::now();

        let status = tracker.observe_completed(&wipro, at);
        assert_eq!(status.state, IngestionState::Completed);
        assert_eq!(status.finished_at, Some(at));

        let again = tracker.observe_completed(&wipro, Utc::now());
        assert_eq!(again, status);
    }

    #[test]
    fn observe_completed_over_failed_entry_reports_completed() {
        let tracker = StatusTracker::new();
        let tcs = ticker("TCS");
        tracker.begin_if_absent_or_terminal(&tcs);
        tracker.start(&tcs);
        tracker.fail(&tcs, "disk full");

        let at = Utc::now();
        let status = tracker.observe_completed(&tcs, at);
        assert_eq!(status.state, IngestionState::Completed);
        assert_eq!(status.error, None);
        assert_eq!(status.finished_at, Some(at));

        // the failed run is still what the tracker records
        assert_eq!(tracker.get(&tcs).unwrap().state, IngestionState::Failed);
    }

    #[test]
    fn observe_completed_leaves_in_flight_entry_admitted() {
        let tracker = StatusTracker::new();
        let infy = ticker("INFY");
        let admitted = tracker.begin_if_absent_or_terminal(&infy);
        tracker.start(&infy);

        let status = tracker.observe_completed(&infy, Utc::now());
        assert_eq!(status.state, IngestionState::Completed);

        let entry = tracker.get(&infy).unwrap();
        assert_eq!(entry.state, IngestionState::InProgress);
        assert_eq!(entry.attempt, admitted.status.attempt);
        assert!(!tracker.begin_if_absent_or_terminal(&infy).accepted);
    }

    #[tokio::test]
    async fn publishes_every_transition() {
        let tracker = StatusTracker::new();
        let mut events = tracker.subscribe();
        let itc = ticker("ITC");

        tracker.begin_if_absent_or_terminal(&itc);
        tracker.start(&itc);
        tracker.advance(&itc, Phase::Fetch);
        tracker.complete(&itc, SectionCoverage::default());

        let mut states = vec![];
        while let Ok(status) = events.try_recv() {
            states.push(status.state);
        }
        use IngestionState::*;
        assert_eq!(states, [Queued, InProgress, InProgress, Completed]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multithreaded_admission_stress_test() {
        let tracker = Arc::new(StatusTracker::new());
        let labels = ["SUZLON", "TCS", "INFY", "ITC"];

        let mut handles = vec![];
        for _ in 0..16 {
            for label in labels {
                let tracker = tracker.clone();
                handles.push(tokio::spawn(async move {
                    tracker.begin_if_absent_or_terminal(&ticker(label))
                }));
            }
        }

        let mut accepted = std::collections::HashMap::new();
        for handle in handles {
            let admission = handle.await.unwrap();
            if admission.accepted {
                *accepted.entry(admission.status.ticker.clone()).or_insert(0) += 1;
            }
        }

        assert_eq!(accepted.len(), labels.len());
        assert!(accepted.values().all(|count| *count == 1));
    }
}
