//! Cross-grain reconciliation: company totals recomputed from the country
//! grain. Detection only; discrepancies are reported, never repaired.

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::aggregate::MonthlyMetricRow;
use crate::config::EngineConfig;
use crate::metrics::round2;

/// One month's company-vs-country comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct QcMonth {
    pub year_month: String,
    pub company_net_sales: f64,
    pub country_total_net_sales: f64,
    pub diff_abs: f64,
    pub exceeds_threshold: bool,
}

/// Reconciliation outcome across all months.
#[derive(Debug, Clone)]
pub struct QcReport {
    pub months: Vec<QcMonth>,
    pub max_diff_abs: f64,
    pub threshold: f64,
}

impl QcReport {
    /// True when no month diverges beyond the threshold.
    pub fn is_aligned(&self) -> bool {
        self.months.iter().all(|m| !m.exceeds_threshold)
    }
}

/// Recompute company-grain net sales from the country grain and flag any
/// month where the absolute difference exceeds the configured threshold.
/// Values are compared after rounding to 2 decimals, matching the handoff
/// precision.
pub fn reconcile_net_sales(
    company: &[MonthlyMetricRow],
    country: &[MonthlyMetricRow],
    cfg: &EngineConfig,
) -> QcReport {
    let mut company_by_month: BTreeMap<&str, f64> = BTreeMap::new();
    for row in company {
        *company_by_month.entry(row.year_month.as_str()).or_default() += row.net_sales;
    }
    let mut country_by_month: BTreeMap<&str, f64> = BTreeMap::new();
    for row in country {
        *country_by_month.entry(row.year_month.as_str()).or_default() += row.net_sales;
    }

    let mut months: Vec<&str> = company_by_month.keys().copied().collect();
    for month in country_by_month.keys() {
        if !company_by_month.contains_key(month) {
            months.push(month);
        }
    }
    months.sort_unstable();

    let mut report_months = Vec::with_capacity(months.len());
    let mut max_diff_abs = 0.0f64;
    for month in months {
        let company_total = round2(company_by_month.get(month).copied().unwrap_or(0.0));
        let country_total = round2(country_by_month.get(month).copied().unwrap_or(0.0));
        let diff_abs = (company_total - country_total).abs();
        max_diff_abs = max_diff_abs.max(diff_abs);
        report_months.push(QcMonth {
            year_month: month.to_string(),
            company_net_sales: company_total,
            country_total_net_sales: country_total,
            diff_abs,
            exceeds_threshold: diff_abs > cfg.reconcile_threshold,
        });
    }

    let report = QcReport {
        months: report_months,
        max_diff_abs,
        threshold: cfg.reconcile_threshold,
    };
    if report.is_aligned() {
        info!(
            max_diff = report.max_diff_abs,
            "company vs country net sales aligned"
        );
    } else {
        error!(
            max_diff = report.max_diff_abs,
            threshold = report.threshold,
            "company vs country net sales mismatch detected"
        );
    }
    report
}
