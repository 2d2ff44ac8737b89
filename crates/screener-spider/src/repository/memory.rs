use super::Repository;
use crate::error::PersistenceError;
use crate::fetcher::RawPage;
use crate::snapshot::{FundamentalsSnapshot, SnapshotMetadata};
use crate::ticker::Ticker;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Stored {
    snapshot: FundamentalsSnapshot,
    page: RawPage,
}

/// In-process repository; a snapshot and its page are swapped in together behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    snapshots: DashMap<Ticker, Arc<Stored>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, ticker: &Ticker) -> Option<Arc<Stored>> {
        self.snapshots.get(ticker).map(|stored| stored.value().clone())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_metadata(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<SnapshotMetadata>, PersistenceError> {
        Ok(self.stored(ticker).map(|stored| stored.snapshot.metadata()))
    }

    async fn get_snapshot(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<FundamentalsSnapshot>, PersistenceError> {
        Ok(self.stored(ticker).map(|stored| stored.snapshot.clone()))
    }

    async fn get_raw_page(&self, ticker: &Ticker) -> Result<Option<RawPage>, PersistenceError> {
        Ok(self.stored(ticker).map(|stored| stored.page.clone()))
    }

    async fn put_snapshot(
        &self,
        snapshot: &FundamentalsSnapshot,
        page: &RawPage,
    ) -> Result<(), PersistenceError> {
        let stored = Stored {
            snapshot: snapshot.clone(),
            page: page.clone(),
        };
        self.snapshots
            .insert(snapshot.ticker.clone(), Arc::new(stored));
        Ok(())
    }
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{DataScope, Sections};
    use chrono::Utc;

    fn page(ticker: &Ticker, html: &str) -> RawPage {
        RawPage {
            ticker: ticker.clone(),
            scope: DataScope::Standalone,
            url: format!("mock://{ticker}/"),
            html: html.to_string(),
        }
    }

    fn snapshot(page: &RawPage) -> FundamentalsSnapshot {
        FundamentalsSnapshot {
            ticker: page.ticker.clone(),
            scope: page.scope,
            sections: Sections::default(),
            derived: Default::default(),
            last_ingested_at: Utc::now(),
            source_version: page.source_version(),
        }
    }

    #[tokio::test]
    async fn page_is_replaced_with_its_snapshot() {
        let repository = MemoryRepository::new();
        let itc = Ticker::parse("ITC").unwrap();
        assert!(repository.get_raw_page(&itc).await.unwrap().is_none());

        let first = page(&itc, "<html>first</html>");
        repository.put_snapshot(&snapshot(&first), &first).await.unwrap();

        let second = page(&itc, "<html>second</html>");
        repository.put_snapshot(&snapshot(&second), &second).await.unwrap();

        let archived = repository.get_raw_page(&itc).await.unwrap().unwrap();
        let stored = repository.get_snapshot(&itc).await.unwrap().unwrap();
        assert_eq!(archived.html, "<html>second</html>");
        assert_eq!(archived.source_version(), stored.source_version);
    }
}
