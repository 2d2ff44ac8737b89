use crate::http::var;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Runtime configuration for the ingestion pipeline, read from the environment (and `.env`).
///
/// | variable                      | default                                      |
/// |-------------------------------|----------------------------------------------|
/// | `SCREENER_BASE_URL`           | `https://www.screener.in/company`            |
/// | `USER_AGENT`                  | `Mozilla/5.0 (compatible; ScreenerBot/1.0)`  |
/// | `REQUEST_DELAY_SECONDS`       | `2`                                          |
/// | `FETCH_TIMEOUT_SECONDS`       | `30`                                         |
/// | `FETCH_MAX_ATTEMPTS`          | `3`                                          |
/// | `FETCH_BACKOFF_SECONDS`       | `2`                                          |
/// | `FETCH_MAX_BACKOFF_SECONDS`   | `30`                                         |
/// | `DATA_TTL_DAYS`               | `30`                                         |
/// | `MAX_CONCURRENT_INGESTIONS`   | number of CPUs                               |
/// | `FINDUMP_URL`                 | unset: snapshots are kept in memory          |
/// | `SERVER_ADDR`                 | `127.0.0.1:11234`                            |
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub user_agent: String,
    /// Politeness delay before every upstream request.
    pub request_delay: Duration,
    /// Upper bound on a single fetch attempt.
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    /// How long a stored snapshot stays fresh.
    pub ttl: Duration,
    /// Bound on simultaneously running background ingestions.
    pub max_concurrent: usize,
    pub database_url: Option<String>,
    pub server_addr: String,
}

/// Bounded exponential backoff for transient fetch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based): `base * 2^(attempt - 1)`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://www.screener.in/company".to_string(),
            user_agent: "Mozilla/5.0 (compatible; ScreenerBot/1.0)".to_string(),
            request_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
            max_concurrent: num_cpus::get(),
            database_url: None,
            server_addr: "127.0.0.1:11234".to_string(),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SCREENER_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(agent) = lookup("USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(secs) = parse::<u64>(&lookup, "REQUEST_DELAY_SECONDS")? {
            config.request_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "FETCH_TIMEOUT_SECONDS")? {
            config.fetch_timeout = Duration::from_secs(non_zero("FETCH_TIMEOUT_SECONDS", secs)?);
        }
        if let Some(attempts) = parse::<u32>(&lookup, "FETCH_MAX_ATTEMPTS")? {
            config.retry.max_attempts = non_zero("FETCH_MAX_ATTEMPTS", attempts)?;
        }
        if let Some(secs) = parse::<u64>(&lookup, "FETCH_BACKOFF_SECONDS")? {
            config.retry.base_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "FETCH_MAX_BACKOFF_SECONDS")? {
            config.retry.max_backoff = Duration::from_secs(secs);
        }
        if let Some(days) = parse::<u64>(&lookup, "DATA_TTL_DAYS")? {
            let secs = days.checked_mul(24 * 60 * 60).ok_or_else(|| ConfigError::Invalid {
                key: "DATA_TTL_DAYS",
                value: days.to_string(),
            })?;
            config.ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<usize>(&lookup, "MAX_CONCURRENT_INGESTIONS")? {
            config.max_concurrent = non_zero("MAX_CONCURRENT_INGESTIONS", n)?;
        }
        config.database_url = lookup("FINDUMP_URL").filter(|url| !url.trim().is_empty());
        if let Some(addr) = lookup("SERVER_ADDR") {
            config.server_addr = addr;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

fn non_zero<T: PartialEq + Default>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { key })
    } else {
        Ok(value)
    }
}
