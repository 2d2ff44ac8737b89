use chrono::{DateTime, Utc};
use std::time::Duration;

/// Decides whether a stored snapshot is still usable.
#[derive(Clone, Copy, Debug)]
pub struct FreshnessPolicy {
    ttl: Duration,
}

impl FreshnessPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Fresh iff a snapshot exists and `now - last_ingested_at < ttl`.
    ///
    /// A timestamp ahead of `now` (clock skew between writers) counts as fresh.
    pub fn is_fresh(&self, last_ingested_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_ingested_at else {
            return false;
        };
        match (now - last).to_std() {
            Ok(age) => age < self.ttl,
            Err(_) => true,
        }
    }

    /// `force` overrides freshness unconditionally.
    pub fn should_ingest(
        &self,
        last_ingested_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        force: bool,
    ) -> bool {
        force || !self.is_fresh(last_ingested_at, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy::new(Duration::from_secs(30 * 86_400))
    }

    #[test]
    fn absent_is_stale() {
        assert!(!policy().is_fresh(None, Utc::now()));
        assert!(policy().should_ingest(None, Utc::now(), false));
    }

    #[test]
    fn within_ttl_is_fresh() {
        let now = Utc::now();
        assert!(policy().is_fresh(Some(now - TimeDelta::days(29)), now));
        assert!(!policy().should_ingest(Some(now - TimeDelta::days(29)), now, false));
    }

    #[test]
    fn at_or_past_ttl_is_stale() {
        let now = Utc::now();
        assert!(!policy().is_fresh(Some(now - TimeDelta::days(30)), now));
        assert!(!policy().is_fresh(Some(now - TimeDelta::days(400)), now));
    }

    #[test]
    fn future_timestamps_are_fresh() {
        let now = Utc::now();
        assert!(policy().is_fresh(Some(now + TimeDelta::minutes(5)), now));
    }

    #[test]
    fn force_bypasses_freshness() {
        let now = Utc::now();
        assert!(policy().should_ingest(Some(now), now, true));
    }
}
