use crate::ticker::Ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which variant of the company page a snapshot was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    Consolidated,
    Standalone,
}

impl DataScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataScope::Consolidated => "consolidated",
            DataScope::Standalone => "standalone",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "consolidated" => Some(DataScope::Consolidated),
            "standalone" => Some(DataScope::Standalone),
            _ => None,
        }
    }
}

/// One headline ratio, e.g. `"Market Cap" => ₹ 81,923 Cr.`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    /// The exact text shown on the page.
    pub raw: String,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub metric: String,
    pub value: Option<f64>,
}

/// A column of a financial table: `"Mar 2024"` and its line items, top to bottom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub label: String,
    pub items: Vec<LineItem>,
}

impl Period {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.items
            .iter()
            .find(|item| item.metric == metric)
            .and_then(|item| item.value)
    }
}

/// Everything the extractor pulls off one company page.
///
/// Sequences keep the page's column order (oldest period first). A section the page does not
/// publish is an empty sequence, never an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    pub ratios: BTreeMap<String, Ratio>,
    pub quarterly: Vec<Period>,
    pub profit_loss: Vec<Period>,
    pub balance_sheet: Vec<Period>,
    pub cash_flow: Vec<Period>,
    /// Periods whose line items are holder categories mapped to percentages.
    pub shareholding: Vec<Period>,
}

/// The stored unit of the repository; replaced as a whole on every successful ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsSnapshot {
    pub ticker: Ticker,
    pub scope: DataScope,
    #[serde(flatten)]
    pub sections: Sections,
    pub derived: BTreeMap<String, f64>,
    pub last_ingested_at: DateTime<Utc>,
    /// Hex SHA-256 of the raw page the snapshot was parsed from.
    pub source_version: String,
}

impl FundamentalsSnapshot {
    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            last_ingested_at: self.last_ingested_at,
            source_version: self.source_version.clone(),
        }
    }

    /// Equality ignoring `last_ingested_at`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.ticker == other.ticker
            && self.scope == other.scope
            && self.sections == other.sections
            && self.derived == other.derived
            && self.source_version == other.source_version
    }

    pub fn coverage(&self) -> SectionCoverage {
        SectionCoverage::of(&self.sections, &self.derived)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub last_ingested_at: DateTime<Utc>,
    pub source_version: String,
}

/// Which sections of a snapshot carry data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCoverage {
    pub ratios: bool,
    pub quarterly: bool,
    pub annual: bool,
    pub shareholding: bool,
    pub derived: bool,
}

impl SectionCoverage {
    pub fn of(sections: &Sections, derived: &BTreeMap<String, f64>) -> Self {
        Self {
            ratios: !sections.ratios.is_empty(),
            quarterly: !sections.quarterly.is_empty(),
            annual: !(sections.profit_loss.is_empty()
                && sections.balance_sheet.is_empty()
                && sections.cash_flow.is_empty()),
            shareholding: !sections.shareholding.is_empty(),
            derived: !derived.is_empty(),
        }
    }
}
