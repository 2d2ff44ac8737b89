use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

const MAX_LEN: usize = 32;

/// A case-normalized stock symbol, e.g. `SUZLON` or `M&M`.
///
/// The symbol is trimmed and upper-cased on construction; it is the primary key for every piece
/// of per-instrument state (status entries, stored snapshots). Cloning is cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(Arc<str>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickerError {
    #[error("ticker is empty")]
    Empty,

    #[error("ticker `{0}` is longer than 32 characters")]
    TooLong(String),

    #[error("ticker `{symbol}` contains invalid character `{ch}`")]
    InvalidChar { symbol: String, ch: char },

    /// `.` and `..` would be read as path segments in a company URL.
    #[error("ticker `{0}` is only dots")]
    DotsOnly(String),
}

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(TickerError::Empty);
        }
        if symbol.chars().count() > MAX_LEN {
            return Err(TickerError::TooLong(symbol));
        }
        if let Some(ch) = symbol
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '&' | '.' | '_')))
        {
            return Err(TickerError::InvalidChar { symbol, ch });
        }
        if symbol.chars().all(|ch| ch == '.') {
            return Err(TickerError::DotsOnly(symbol));
        }
        Ok(Self(Arc::from(symbol)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ticker {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0.to_string()
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a list of raw symbols, failing on the first invalid one.
pub fn parse_all<I, S>(raw: I) -> Result<Vec<Ticker>, TickerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter().map(|s| Ticker::parse(s.as_ref())).collect()
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let ticker = Ticker::parse("  suzlon ").unwrap();
        assert_eq!(ticker.as_str(), "SUZLON");
        assert_eq!(ticker, "SUZLON".parse().unwrap());
    }

    #[test]
    fn accepts_exchange_punctuation() {
        assert_eq!(Ticker::parse("m&m").unwrap().as_str(), "M&M");
        assert_eq!(Ticker::parse("bajaj-auto").unwrap().as_str(), "BAJAJ-AUTO");
    }

    #[test]
    fn rejects_bad_symbols() {
        assert_eq!(Ticker::parse("   "), Err(TickerError::Empty));
        assert!(matches!(
            Ticker::parse("../etc"),
            Err(TickerError::InvalidChar { ch: '/', .. })
        ));
        assert!(matches!(
            Ticker::parse(&"A".repeat(33)),
            Err(TickerError::TooLong(_))
        ));
    }

    #[test]
    fn rejects_dot_only_symbols() {
        assert_eq!(Ticker::parse("."), Err(TickerError::DotsOnly(".".into())));
        assert_eq!(Ticker::parse(" .. "), Err(TickerError::DotsOnly("..".into())));
        assert_eq!(Ticker::parse("a.b").unwrap().as_str(), "A.B");
    }

    #[test]
    fn deserializes_through_validation() {
        let ticker: Ticker = serde_json::from_str("\"tcs\"").unwrap();
        assert_eq!(ticker.as_str(), "TCS");
        assert!(serde_json::from_str::<Ticker>("\"a b\"").is_err());
        assert_eq!(serde_json::to_string(&ticker).unwrap(), "\"TCS\"");
    }
}
