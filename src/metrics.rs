//! Reusable metric helpers applied uniformly across every grain.
//!
//! Every ratio in every output table goes through [`safe_div`] so that
//! divide-by-zero and non-finite inputs behave identically everywhere:
//! the result is `None`, never infinity or NaN. The one deliberate
//! exception is AOV, where callers map `None` to 0.0 because "no orders"
//! is a meaningful zero-spend statement rather than an undefined ratio.

use chrono::NaiveDate;

use anyhow::Context;

/// Divide `numerator / denominator`, returning `None` when the denominator
/// is zero or either operand is non-finite.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// Share of a per-bucket total. Same null semantics as [`safe_div`].
pub fn share_of_total(value: f64, total: f64) -> Option<f64> {
    safe_div(value, total)
}

/// Derive the canonical period date (first of month) from a "YYYY-MM" key.
///
/// This is the sort key for every time-ordered operation; a bucket key that
/// does not parse is an input-contract violation.
pub fn period_from_year_month(year_month: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{year_month}-01"), "%Y-%m-%d")
        .with_context(|| format!("invalid year_month bucket '{year_month}'"))
}

/// Month-over-month percent change for a series already sorted by period
/// within one dimension.
///
/// The first element has no prior value and is `None`, not zero; a zero
/// prior value also yields `None`.
pub fn month_over_month(series: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<f64> = None;
    for &current in series {
        out.push(match prev {
            Some(p) => safe_div(current - p, p),
            None => None,
        });
        prev = Some(current);
    }
    out
}

/// Round to 2 decimal places (handoff precision for monetary values).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
