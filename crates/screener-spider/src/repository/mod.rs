use crate::error::PersistenceError;
use crate::fetcher::RawPage;
use crate::snapshot::{FundamentalsSnapshot, SnapshotMetadata};
use crate::ticker::Ticker;
use async_trait::async_trait;

mod memory;
mod postgres;
mod sql;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Durable store of one [`FundamentalsSnapshot`] per ticker.
///
/// `put_snapshot` replaces the stored snapshot as a whole: readers see either the previous
/// snapshot or the new one, never a mix, and a failed put leaves the previous one in place.
/// The page the snapshot was parsed from is archived alongside it, in the same replace.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_metadata(&self, ticker: &Ticker)
        -> Result<Option<SnapshotMetadata>, PersistenceError>;

    async fn get_snapshot(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<FundamentalsSnapshot>, PersistenceError>;

    /// The page archived with the current snapshot.
    async fn get_raw_page(&self, ticker: &Ticker) -> Result<Option<RawPage>, PersistenceError>;

    async fn put_snapshot(
        &self,
        snapshot: &FundamentalsSnapshot,
        page: &RawPage,
    ) -> Result<(), PersistenceError>;
}
