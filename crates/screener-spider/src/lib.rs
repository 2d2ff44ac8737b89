pub mod bulk;
pub mod config;
pub mod coordinator;
pub mod derived;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod freshness;
pub mod query;
pub mod repository;
pub mod snapshot;
pub mod status;
pub mod ticker;

pub use config::Config;
pub use coordinator::{Coordinator, IngestOutcome};
pub use snapshot::FundamentalsSnapshot;
pub use status::{IngestionState, IngestionStatus, StatusTracker};
pub use ticker::Ticker;

/// Shortcut for required API elements.
pub(crate) mod http {
    pub(crate) use dotenv::var;
    pub(crate) use reqwest::Client as HttpClient;
}

/// Formats the time elapsed since `time`, for trailing log messages.
pub(crate) fn time_elapsed(time: std::time::Instant) -> String {
    format!("time elapsed: {:.3}s", time.elapsed().as_secs_f64())
}
