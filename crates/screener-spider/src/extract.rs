//! Turns a raw company page into typed [`Sections`].
//!
//! The page layout is:
//! ```text
//! div.company-ratios > ul#top-ratios > li > (span.name, span.value)
//! section#quarters       > table.data-table
//! section#profit-loss    > table.data-table     <- required
//! section#balance-sheet  > table.data-table
//! section#cash-flow      > table.data-table
//! section#shareholding   > table.data-table     <- first (quarterly) table
//! ```
//! Every data table has a header row of period labels (first cell blank) and one body row per
//! metric, the metric label in the first cell.

use crate::error::ParseError;
use crate::snapshot::{LineItem, Period, Ratio, Sections};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

lazy_static::lazy_static! {
    static ref TOP_RATIOS: Selector = selector("ul#top-ratios");
    static ref RATIO_ITEM: Selector = selector("li");
    static ref RATIO_NAME: Selector = selector("span.name");
    static ref RATIO_VALUE: Selector = selector("span.value");
    static ref DATA_TABLE: Selector = selector("table.data-table");
    static ref ROW: Selector = selector("tr");
    static ref HEADER_CELL: Selector = selector("th");
    static ref BODY_CELL: Selector = selector("td");
    static ref QUARTERS: Selector = selector("section#quarters");
    static ref PROFIT_LOSS: Selector = selector("section#profit-loss");
    static ref BALANCE_SHEET: Selector = selector("section#balance-sheet");
    static ref CASH_FLOW: Selector = selector("section#cash-flow");
    static ref SHAREHOLDING: Selector = selector("section#shareholding");
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a company page into its sections.
pub fn parse(html: &str) -> Result<Sections, ParseError> {
    let doc = Html::parse_document(html);

    let ratios = parse_ratios(&doc)?;
    let profit_loss = match table_in(&doc, &PROFIT_LOSS) {
        Some(table) => parse_table(table, "profit-loss")?,
        None => return Err(ParseError::MissingSection("profit-loss")),
    };

    Ok(Sections {
        ratios,
        quarterly: optional_table(&doc, &QUARTERS, "quarters")?,
        profit_loss,
        balance_sheet: optional_table(&doc, &BALANCE_SHEET, "balance-sheet")?,
        cash_flow: optional_table(&doc, &CASH_FLOW, "cash-flow")?,
        shareholding: optional_table(&doc, &SHAREHOLDING, "shareholding")?,
    })
}

/// Whether the page's profit & loss table has at least one fiscal-year column.
///
/// Consolidated pages of companies without subsidiaries carry an empty shell of this table; the
/// standalone page is used for those.
pub fn has_annual_data(html: &str) -> bool {
    let doc = Html::parse_document(html);
    match table_in(&doc, &PROFIT_LOSS) {
        Some(table) => header_labels(table)
            .map(|labels| labels.iter().any(|label| is_fiscal_year(label)))
            .unwrap_or(false),
        None => false,
    }
}

fn parse_ratios(doc: &Html) -> Result<BTreeMap<String, Ratio>, ParseError> {
    let list = doc
        .select(&TOP_RATIOS)
        .next()
        .ok_or(ParseError::MissingSection("top-ratios"))?;

    let mut ratios = BTreeMap::new();
    for item in list.select(&RATIO_ITEM) {
        let (Some(name), Some(value)) = (
            item.select(&RATIO_NAME).next(),
            item.select(&RATIO_VALUE).next(),
        ) else {
            continue;
        };

        let name = norm_text(name);
        if name.is_empty() {
            continue;
        }
        let raw = norm_text(value);
        let value = clean_number(&raw);
        ratios.insert(name, Ratio { raw, value });
    }

    Ok(ratios)
}

fn table_in<'a>(doc: &'a Html, section: &Selector) -> Option<ElementRef<'a>> {
    doc.select(section)
        .next()
        .and_then(|section| section.select(&DATA_TABLE).next())
}

// An absent section, or one without a data table, is simply unpublished data.
fn optional_table(
    doc: &Html,
    section: &Selector,
    name: &'static str,
) -> Result<Vec<Period>, ParseError> {
    match table_in(doc, section) {
        Some(table) => parse_table(table, name),
        None => Ok(Vec::new()),
    }
}

fn header_labels(table: ElementRef) -> Option<Vec<String>> {
    table
        .select(&ROW)
        .map(|tr| tr.select(&HEADER_CELL).map(norm_text).collect::<Vec<_>>())
        .find(|cells| !cells.is_empty())
}

fn parse_table(table: ElementRef, section: &'static str) -> Result<Vec<Period>, ParseError> {
    let header = header_labels(table).ok_or_else(|| ParseError::MalformedTable {
        section,
        reason: "no header row".to_string(),
    })?;
    if header.len() < 2 {
        return Err(ParseError::MalformedTable {
            section,
            reason: "header row has no period columns".to_string(),
        });
    }

    let mut periods: Vec<Period> = header[1..]
        .iter()
        .map(|label| Period {
            label: label.clone(),
            items: Vec::new(),
        })
        .collect();

    for (idx, tr) in table.select(&ROW).enumerate() {
        let cells: Vec<String> = tr.select(&BODY_CELL).map(norm_text).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() != header.len() {
            return Err(ParseError::MalformedTable {
                section,
                reason: format!(
                    "row {idx} has {} cells, header has {}",
                    cells.len(),
                    header.len()
                ),
            });
        }

        let metric = normalize_metric(&cells[0]);
        if metric.is_empty() {
            continue;
        }
        for (period, cell) in periods.iter_mut().zip(&cells[1..]) {
            period.items.push(LineItem {
                metric: metric.clone(),
                value: clean_number(cell),
            });
        }
    }

    Ok(periods)
}

fn norm_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop the expand button marker: `"Sales +"` becomes `"Sales"`.
pub fn normalize_metric(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('+')
        .trim_end()
        .to_string()
}

/// Parse a displayed figure such as `"₹ 1,234.5 Cr."` or `"12.3 %"`; anything that is not a
/// plain decimal after cleaning becomes `None`.
pub fn clean_number(raw: &str) -> Option<f64> {
    let cleaned = raw
        .replace('\u{a0}', " ")
        .replace(['₹', ',', '%'], "")
        .replace("Cr.", "")
        .replace("Cr", "");
    let cleaned = cleaned.trim();

    let digits = cleaned.strip_prefix('-').unwrap_or(cleaned);
    let mut parts = digits.split('.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next();
    let plain = !whole.is_empty()
        && whole.chars().all(|ch| ch.is_ascii_digit())
        && parts.next().is_none()
        && fraction.map_or(true, |f| !f.is_empty() && f.chars().all(|ch| ch.is_ascii_digit()));

    if plain {
        cleaned.parse().ok()
    } else {
        None
    }
}

/// `"Mar 2024"` is a fiscal year column, `"TTM"` is not.
pub fn is_fiscal_year(label: &str) -> bool {
    let mut parts = label.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(month), Some(year), None) => {
            MONTHS.contains(&month) && year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
