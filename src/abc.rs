//! ABC product tiering by cumulative revenue contribution.

use crate::aggregate::SnapshotRow;
use crate::config::EngineConfig;

/// One product's Pareto classification.
#[derive(Debug, Clone, PartialEq)]
pub struct AbcRow {
    pub product_code: String,
    pub tier: char,
    /// Running share of total positive net sales, in descending net-sales
    /// order.
    pub cum_share_net_sales: f64,
}

/// Label products A/B/C by cumulative share of total positive net sales.
///
/// Negative lifetime net sales are clamped to zero for ranking so heavy
/// net-refund products cannot shrink the denominator. When every product
/// nets to zero or less, all shares are zero and everything lands in "A".
pub fn classify_abc(product_snapshot: &[SnapshotRow], cfg: &EngineConfig) -> Vec<AbcRow> {
    let mut products: Vec<(&str, f64)> = product_snapshot
        .iter()
        .map(|row| (row.dimension.as_str(), row.net_sales.max(0.0)))
        .collect();
    products.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = products.iter().map(|(_, v)| v).sum();
    let denominator = if total > 0.0 { total } else { 1.0 };

    let mut running = 0.0;
    products
        .into_iter()
        .map(|(code, clamped)| {
            running += clamped;
            let share = running / denominator;
            let tier = if share <= cfg.abc_a_cutoff {
                'A'
            } else if share <= cfg.abc_b_cutoff {
                'B'
            } else {
                'C'
            };
            AbcRow {
                product_code: code.to_string(),
                tier,
                cum_share_net_sales: share,
            }
        })
        .collect()
}
