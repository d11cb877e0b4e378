//! Engine configuration.
//!
//! One explicit value passed into every component at construction; there is
//! no process-wide cached configuration and no environment lookup inside the
//! core. The CLI layer builds this from flags, tests build it directly.

use chrono::NaiveDate;

/// Tunable parameters for the aggregation and scoring engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reference date for recency calculations. When `None`, the maximum
    /// transaction timestamp in the input is used.
    pub as_of: Option<NaiveDate>,
    /// CLV projection horizon in months.
    pub clv_horizon_months: u32,
    /// Trailing window (in observed months) for the CLV monthly average.
    pub clv_window_months: usize,
    /// Cumulative revenue share boundary for the "A" tier.
    pub abc_a_cutoff: f64,
    /// Cumulative revenue share boundary for the "B" tier.
    pub abc_b_cutoff: f64,
    /// Recency (days) upper bound for Low churn risk.
    pub churn_low_days: i64,
    /// Recency (days) upper bound for Medium churn risk.
    pub churn_medium_days: i64,
    /// Recency (days) upper bound for High churn risk; beyond is Very High.
    pub churn_high_days: i64,
    /// Maximum tolerated company-vs-country net sales divergence per month,
    /// in currency units.
    pub reconcile_threshold: f64,
    /// Bucket label substituted for a missing country.
    pub unspecified_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            as_of: None,
            clv_horizon_months: 12,
            clv_window_months: 3,
            abc_a_cutoff: 0.80,
            abc_b_cutoff: 0.95,
            churn_low_days: 30,
            churn_medium_days: 90,
            churn_high_days: 180,
            reconcile_threshold: 1.0,
            unspecified_label: "Unspecified".to_string(),
        }
    }
}
