//! Customer lifecycle analytics: RFM scoring, segment labels, a simple CLV
//! estimate and a churn-risk bucket.
//!
//! Everything here is recomputed from the customer snapshot and the
//! customer-by-month series on every run; nothing is updated incrementally.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::aggregate::{customer_snapshot, MonthlyMetricRow};
use crate::config::EngineConfig;
use crate::data::TransactionLine;

/// Per-customer KPI record (one row of the `customer_kpis` table).
#[derive(Debug, Clone)]
pub struct CustomerKpiRow {
    pub customer_id: String,
    pub first_purchase: NaiveDateTime,
    pub last_purchase: NaiveDateTime,
    pub recency_days: i64,
    pub tenure_days: i64,
    pub churn_risk: ChurnRisk,
    pub gmv: f64,
    pub returns_value: f64,
    pub net_sales: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub orders: u64,
    pub items_sold: f64,
    pub aov: f64,
    /// Order count, the F input.
    pub frequency: u64,
    /// Lifetime net sales, the M input.
    pub monetary: f64,
    pub gross_margin_pct: Option<f64>,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// R*100 + F*10 + M.
    pub rfm_score: u16,
    pub segment: &'static str,
    /// Trailing-window average of monthly net sales at the customer's last
    /// active month (unclamped).
    pub clv_monthly_avg: f64,
    /// max(clv_monthly_avg, 0) * horizon months.
    pub clv_estimate: f64,
}

/// Churn-risk bucket derived from recency thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnRisk {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ChurnRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnRisk::Low => "Low",
            ChurnRisk::Medium => "Medium",
            ChurnRisk::High => "High",
            ChurnRisk::VeryHigh => "Very High",
        }
    }
}

/// Bucket recency into churn risk.
pub fn churn_risk_from_recency(recency_days: i64, cfg: &EngineConfig) -> ChurnRisk {
    if recency_days <= cfg.churn_low_days {
        ChurnRisk::Low
    } else if recency_days <= cfg.churn_medium_days {
        ChurnRisk::Medium
    } else if recency_days <= cfg.churn_high_days {
        ChurnRisk::High
    } else {
        ChurnRisk::VeryHigh
    }
}

/// Quantile scores 1 (worst) to 5 (best) for one RFM input series.
///
/// With fewer than 5 distinct values a raw quantile cut cannot produce five
/// usable buckets, so the score falls back to percentile-rank binning
/// instead of failing. The fallback is the common case on small inputs.
pub fn quantile_scores(values: &[f64]) -> Vec<u8> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = 1;
    for window in sorted.windows(2) {
        if window[0] < window[1] {
            distinct += 1;
        }
    }

    if distinct >= 5 {
        // Interpolated quantile cut points at 20/40/60/80%.
        let cuts: Vec<f64> = (1..5)
            .map(|i| {
                let pos = (i as f64 / 5.0) * (n - 1) as f64;
                let lower = pos.floor() as usize;
                let upper = pos.ceil() as usize;
                let weight = pos - lower as f64;
                sorted[lower] * (1.0 - weight) + sorted[upper] * weight
            })
            .collect();
        values
            .iter()
            .map(|&v| 1 + cuts.iter().filter(|&&cut| v > cut).count() as u8)
            .collect()
    } else {
        // Percentile-rank binning (average rank over ties).
        values
            .iter()
            .map(|&v| {
                let below = sorted.partition_point(|&s| s < v);
                let not_above = sorted.partition_point(|&s| s <= v);
                let avg_rank = (below + 1 + not_above) as f64 / 2.0;
                let pct = avg_rank / n as f64;
                ((pct * 5.0).ceil() as u8).clamp(1, 5)
            })
            .collect()
    }
}

/// Segment ladder, first match wins.
pub fn segment_label(r: u8, f: u8, m: u8) -> &'static str {
    if r >= 4 && f >= 4 && m >= 4 {
        "Champions"
    } else if r >= 4 && f >= 3 {
        "Loyal"
    } else if r >= 3 && m >= 4 {
        "Big Spenders"
    } else if r <= 2 && f <= 2 {
        "At Risk"
    } else if r >= 4 && f <= 2 {
        "Potential Loyalist"
    } else {
        "Regular"
    }
}

/// Trailing average of the last `window` observed monthly net-sales values
/// per customer. The input rows must be sorted by (customer, period), which
/// is how the customer monthly builder emits them.
fn trailing_monthly_average(
    customer_monthly: &[MonthlyMetricRow],
    window: usize,
) -> HashMap<String, f64> {
    let mut series: HashMap<String, Vec<f64>> = HashMap::new();
    for row in customer_monthly {
        if let Some(customer) = &row.dimension {
            series.entry(customer.clone()).or_default().push(row.net_sales);
        }
    }
    series
        .into_iter()
        .map(|(customer, values)| {
            let tail = &values[values.len().saturating_sub(window.max(1))..];
            let avg = tail.iter().sum::<f64>() / tail.len() as f64;
            (customer, avg)
        })
        .collect()
}

/// Build the `customer_kpis` table from the transaction slice and the
/// customer-by-month series.
pub fn build_customer_kpis(
    tx: &[TransactionLine],
    customer_monthly: &[MonthlyMetricRow],
    cfg: &EngineConfig,
) -> crate::Result<Vec<CustomerKpiRow>> {
    let snaps = customer_snapshot(tx, cfg);
    if snaps.is_empty() {
        return Ok(Vec::new());
    }

    // Recency is inverted: a smaller gap since the last purchase is better.
    let recency_inverted: Vec<f64> = snaps.iter().map(|s| -(s.recency_days as f64)).collect();
    let frequency: Vec<f64> = snaps.iter().map(|s| s.frequency as f64).collect();
    let monetary: Vec<f64> = snaps.iter().map(|s| s.monetary).collect();

    let r_scores = quantile_scores(&recency_inverted);
    let f_scores = quantile_scores(&frequency);
    let m_scores = quantile_scores(&monetary);

    let monthly_avg = trailing_monthly_average(customer_monthly, cfg.clv_window_months);

    let rows = snaps
        .into_iter()
        .enumerate()
        .map(|(i, snap)| {
            let (r, f, m) = (r_scores[i], f_scores[i], m_scores[i]);
            let clv_monthly_avg = monthly_avg.get(&snap.customer_id).copied().unwrap_or(0.0);
            CustomerKpiRow {
                churn_risk: churn_risk_from_recency(snap.recency_days, cfg),
                r_score: r,
                f_score: f,
                m_score: m,
                rfm_score: r as u16 * 100 + f as u16 * 10 + m as u16,
                segment: segment_label(r, f, m),
                clv_monthly_avg,
                clv_estimate: clv_monthly_avg.max(0.0) * cfg.clv_horizon_months as f64,
                customer_id: snap.customer_id,
                first_purchase: snap.first_purchase,
                last_purchase: snap.last_purchase,
                recency_days: snap.recency_days,
                tenure_days: snap.tenure_days,
                gmv: snap.gmv,
                returns_value: snap.returns_value,
                net_sales: snap.monetary,
                cogs_net: snap.cogs_net,
                gp_net: snap.gp_net,
                orders: snap.frequency,
                items_sold: snap.items_sold,
                aov: snap.aov,
                frequency: snap.frequency,
                monetary: snap.monetary,
                gross_margin_pct: snap.gross_margin_pct,
            }
        })
        .collect();
    Ok(rows)
}
