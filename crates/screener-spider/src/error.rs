use thiserror::Error;

/// Failure to retrieve a company page from upstream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Network trouble, a timeout, or an upstream status worth another attempt.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The upstream site has no page for this ticker.
    #[error("no company page found at {0}")]
    NotFound(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// The page did not have the structure the extractor expects. Never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("required section `{0}` is missing from the page")]
    MissingSection(&'static str),

    #[error("malformed table in section `{section}`: {reason}")]
    MalformedTable {
        section: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write snapshot for [{ticker}]: {reason}")]
    WriteFailed { ticker: String, reason: String },

    #[error("failed to read from the repository: {0}")]
    ReadFailed(String),

    #[error("failed to get a database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("failed to create the connection pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),
}

impl From<tokio_postgres::Error> for PersistenceError {
    fn from(err: tokio_postgres::Error) -> Self {
        PersistenceError::ReadFailed(err.to_string())
    }
}

/// Terminal failure of one pipeline run; its `Display` is what gets recorded on the status.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("ingestion task aborted: {0}")]
    Aborted(String),
}
