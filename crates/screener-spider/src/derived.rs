use crate::extract::is_fiscal_year;
use crate::snapshot::{Period, Sections};
use std::collections::BTreeMap;

/// Ratios computed from the annual tables rather than read off the page:
///
/// - `Sales`, `EPS`, `OPM` from the latest fiscal year;
/// - `Debt to Equity` as borrowings over (equity capital + reserves);
/// - `Sales growth 3Years` and `Profit Var 3Yrs` as 3-year compound growth rates, in percent.
///
/// Growth needs four fiscal years of history; profit growth is skipped unless both ends are
/// positive.
pub fn compute(sections: &Sections) -> BTreeMap<String, f64> {
    let mut derived = BTreeMap::new();

    let years = fiscal_years(&sections.profit_loss);
    let Some(latest) = years.last() else {
        return derived;
    };

    if let Some(sales) = latest.get("Sales") {
        derived.insert("Sales".to_string(), sales);
    }
    if let Some(eps) = latest.get("EPS in Rs") {
        derived.insert("EPS".to_string(), eps);
    }
    if let Some(opm) = latest.get("OPM %") {
        derived.insert("OPM".to_string(), opm);
    }

    if let Some(balance) = fiscal_years(&sections.balance_sheet).last() {
        let borrowings = balance.get("Borrowings");
        let equity = balance.get("Equity Capital");
        let reserves = balance.get("Reserves");
        if let (Some(borrowings), Some(equity), Some(reserves)) = (borrowings, equity, reserves) {
            if let Some(ratio) = safe_div(borrowings, equity + reserves) {
                derived.insert("Debt to Equity".to_string(), ratio);
            }
        }
    }

    if years.len() >= 4 {
        let base = years[years.len() - 4];
        if let Some(growth) = cagr(base.get("Sales"), latest.get("Sales")) {
            derived.insert("Sales growth 3Years".to_string(), growth);
        }
        if let Some(growth) = cagr(base.get("Net Profit"), latest.get("Net Profit")) {
            derived.insert("Profit Var 3Yrs".to_string(), growth);
        }
    }

    derived
}

// Fiscal-year columns only, oldest first; drops "TTM" and the like.
fn fiscal_years(periods: &[Period]) -> Vec<&Period> {
    let mut years: Vec<&Period> = periods
        .iter()
        .filter(|period| is_fiscal_year(&period.label))
        .collect();
    years.sort_by_key(|period| year_of(&period.label));
    years
}

fn year_of(label: &str) -> u32 {
    label
        .split_whitespace()
        .last()
        .and_then(|year| year.parse().ok())
        .unwrap_or(0)
}

fn cagr(from: Option<f64>, to: Option<f64>) -> Option<f64> {
    match (from, to) {
        (Some(from), Some(to)) if from > 0.0 && to > 0.0 => {
            Some(round2(((to / from).powf(1.0 / 3.0) - 1.0) * 100.0))
        }
        _ => None,
    }
}

fn safe_div(n: f64, d: f64) -> Option<f64> {
    if d == 0.0 {
        None
    } else {
        Some(round2(n / d))
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
