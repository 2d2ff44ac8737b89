use crate::config::{Config, RetryPolicy};
use crate::error::FetchError;
use crate::http::*;
use crate::snapshot::DataScope;
use crate::ticker::Ticker;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// One company page as served upstream.
#[derive(Clone, Debug)]
pub struct RawPage {
    pub ticker: Ticker,
    pub scope: DataScope,
    pub url: String,
    pub html: String,
}

impl RawPage {
    /// Hex SHA-256 of the page body; equal pages give equal versions.
    pub fn source_version(&self) -> String {
        hex::encode(Sha256::digest(self.html.as_bytes()))
    }
}

/// Source of raw company pages.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, ticker: &Ticker, scope: DataScope) -> Result<RawPage, FetchError>;
}

/// Fetches company pages over HTTP, e.g. `https://www.screener.in/company/SUZLON/consolidated/`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: HttpClient,
    base_url: String,
    request_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_delay: config.request_delay,
        })
    }

    pub fn url(&self, ticker: &Ticker, scope: DataScope) -> String {
        match scope {
            DataScope::Consolidated => format!("{}/{ticker}/consolidated/", self.base_url),
            DataScope::Standalone => format!("{}/{ticker}/", self.base_url),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, ticker: &Ticker, scope: DataScope) -> Result<RawPage, FetchError> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let url = self.url(ticker, scope);
        trace!("fetching {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Transient(format!("{url}: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(FetchError::NotFound(url));
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("{url} returned {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|err| FetchError::Transient(format!("{url}: {err}")))?;
        debug!("fetched {url}, {} bytes", html.len());

        Ok(RawPage {
            ticker: ticker.clone(),
            scope,
            url,
            html,
        })
    }
}

/// Fetch with a per-attempt `timeout`, retrying transient failures with exponential backoff.
///
/// A timeout counts as transient. `NotFound` is returned at once.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    ticker: &Ticker,
    scope: DataScope,
    policy: RetryPolicy,
    timeout: Duration,
) -> Result<RawPage, FetchError> {
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, fetcher.fetch(ticker, scope)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "fetch timed out after {timeout:?}"
            ))),
        };

        match result {
            Ok(page) => return Ok(page),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "fetch attempt {attempt} for [{ticker}] failed, retrying in {delay:?}, error({err})"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of results, one per call.
    struct Scripted {
        script: Mutex<Vec<Result<(), FetchError>>>,
        calls: AtomicU32,
        hang: bool,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<(), FetchError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl Fetcher for Scripted {
        async fn fetch(&self, ticker: &Ticker, scope: DataScope) -> Result<RawPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let next = self.script.lock().unwrap().pop().unwrap_or(Ok(()));
            next.map(|_| RawPage {
                ticker: ticker.clone(),
                scope,
                url: "mock".to_string(),
                html: "<html></html>".to_string(),
            })
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn tcs() -> Ticker {
        Ticker::parse("TCS").unwrap()
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let fetcher = Scripted::new(vec![
            Err(FetchError::Transient("reset".into())),
            Err(FetchError::Transient("503".into())),
            Ok(()),
        ]);
        let page = fetch_with_retry(
            &fetcher,
            &tcs(),
            DataScope::Consolidated,
            policy(3),
            Duration::from_secs(1),
        )
        .await;
        assert!(page.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fetcher = Scripted::new(vec![
            Err(FetchError::Transient("1".into())),
            Err(FetchError::Transient("2".into())),
            Err(FetchError::Transient("3".into())),
        ]);
        let err = fetch_with_retry(
            &fetcher,
            &tcs(),
            DataScope::Consolidated,
            policy(2),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err, FetchError::Transient("2".into()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let fetcher = Scripted::new(vec![Err(FetchError::NotFound("gone".into()))]);
        let err = fetch_with_retry(
            &fetcher,
            &tcs(),
            DataScope::Standalone,
            policy(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient() {
        let mut fetcher = Scripted::new(vec![]);
        fetcher.hang = true;
        let err = fetch_with_retry(
            &fetcher,
            &tcs(),
            DataScope::Consolidated,
            policy(2),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_version_is_content_hash() {
        let page = |html: &str| RawPage {
            ticker: tcs(),
            scope: DataScope::Consolidated,
            url: String::new(),
            html: html.to_string(),
        };
        assert_eq!(page("a").source_version(), page("a").source_version());
        assert_ne!(page("a").source_version(), page("b").source_version());
        assert_eq!(page("").source_version().len(), 64);
    }
}
