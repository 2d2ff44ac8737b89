#![allow(dead_code)]

use async_trait::async_trait;
use screener_spider::error::{FetchError, PersistenceError};
use screener_spider::fetcher::{Fetcher, RawPage};
use screener_spider::repository::{MemoryRepository, Repository};
use screener_spider::snapshot::{DataScope, FundamentalsSnapshot, SnapshotMetadata};
use screener_spider::status::IngestionState;
use screener_spider::{Config, Coordinator, IngestionStatus, Ticker};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const SUZLON_HTML: &str = include_str!("../files/suzlon.html");

/// A consolidated page whose profit & loss table has no fiscal-year column.
pub const SHELL_HTML: &str = r#"
<html><body>
  <ul id="top-ratios">
    <li><span class="name">Market Cap</span><span class="value">₹ 10 Cr.</span></li>
  </ul>
  <section id="profit-loss">
    <table class="data-table">
      <thead><tr><th></th><th>TTM</th></tr></thead>
      <tbody><tr><td>Sales +</td><td></td></tr></tbody>
    </table>
  </section>
</body></html>
"#;

pub fn ticker(s: &str) -> Ticker {
    Ticker::parse(s).unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.request_delay = Duration::ZERO;
    config.fetch_timeout = Duration::from_secs(5);
    config.retry.base_backoff = Duration::from_millis(1);
    config.retry.max_backoff = Duration::from_millis(4);
    config.max_concurrent = 4;
    config
}

pub type Response = Result<String, FetchError>;

/// Scripted upstream. Responses for a `(ticker, scope)` are served in order; the last one
/// repeats. Unscripted pages are `NotFound`.
#[derive(Default)]
pub struct MockFetcher {
    script: Mutex<HashMap<(String, DataScope), VecDeque<Response>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    panics_on: Option<String>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch takes one permit of `gate` for good; add a permit per fetch to let it through.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn panicking_on(mut self, ticker: &str) -> Self {
        self.panics_on = Some(ticker.to_string());
        self
    }

    pub fn page(self, ticker: &str, scope: DataScope, response: Response) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry((ticker.to_string(), scope))
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, ticker: &Ticker, scope: DataScope) -> Result<RawPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.panics_on.as_deref() == Some(ticker.as_str()) {
            panic!("upstream exploded for {ticker}");
        }

        let url = format!("mock://{ticker}/{}", scope.as_str());
        let response = {
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&(ticker.to_string(), scope)) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => Err(FetchError::NotFound(url.clone())),
            }
        };

        response.map(|html| RawPage {
            ticker: ticker.clone(),
            scope,
            url,
            html,
        })
    }
}

/// Memory repository whose reads or writes can be switched to fail.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn get_metadata(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<SnapshotMetadata>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::ReadFailed("repository offline".to_string()));
        }
        self.inner.get_metadata(ticker).await
    }

    async fn get_snapshot(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<FundamentalsSnapshot>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::ReadFailed("repository offline".to_string()));
        }
        self.inner.get_snapshot(ticker).await
    }

    async fn get_raw_page(&self, ticker: &Ticker) -> Result<Option<RawPage>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::ReadFailed("repository offline".to_string()));
        }
        self.inner.get_raw_page(ticker).await
    }

    async fn put_snapshot(
        &self,
        snapshot: &FundamentalsSnapshot,
        page: &RawPage,
    ) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed {
                ticker: snapshot.ticker.to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_snapshot(snapshot, page).await
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub fetcher: Arc<MockFetcher>,
    pub repository: Arc<FlakyRepository>,
}

impl Harness {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self::with_config(fetcher, test_config())
    }

    pub fn with_config(fetcher: MockFetcher, config: Config) -> Self {
        let fetcher = Arc::new(fetcher);
        let repository = Arc::new(FlakyRepository::new());
        let coordinator = Coordinator::new(&config, fetcher.clone(), repository.clone());
        Self {
            coordinator,
            fetcher,
            repository,
        }
    }

    /// A second coordinator (empty tracker) over the same fetcher and repository.
    pub fn restarted(&self) -> Coordinator {
        Coordinator::new(
            &test_config(),
            self.fetcher.clone(),
            self.repository.clone(),
        )
    }

    pub async fn ingest_and_wait(&self, symbol: &str, force: bool) -> IngestionStatus {
        let ticker = ticker(symbol);
        self.coordinator.ingest(&ticker, force).await;
        tokio::time::timeout(Duration::from_secs(10), self.coordinator.wait(&ticker))
            .await
            .expect("ingestion did not finish in time")
            .expect("ticker was never admitted")
    }

    /// Poll until the tracker shows `state` for `symbol`.
    pub async fn until_state(&self, symbol: &str, state: IngestionState) {
        let ticker = ticker(symbol);
        for _ in 0..500 {
            if self.coordinator.tracker().get(&ticker).map(|s| s.state) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("[{symbol}] never reached {state:?}");
    }
}

pub fn suzlon_fetcher() -> MockFetcher {
    MockFetcher::new().page(
        "SUZLON",
        DataScope::Consolidated,
        Ok(SUZLON_HTML.to_string()),
    )
}
