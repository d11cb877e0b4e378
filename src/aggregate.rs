//! Grain aggregation: one pass over the transaction table per grain.
//!
//! Every builder follows the same shape the silver/gold tables share:
//! unfiltered sums keep their sign (so returns net out of `net_sales`,
//! `cogs_net` and `gp_net` automatically), distinct orders / buyers /
//! units / GMV come from the sale-only subset, and return value / units
//! come from the return-only subset as absolute values. A grouping key
//! with no rows in a filtered subset gets zero counts, never null;
//! ratios with an undefined denominator stay `None`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::EngineConfig;
use crate::data::TransactionLine;
use crate::metrics::{month_over_month, period_from_year_month, safe_div, share_of_total};

/// Raw sums for one grouping key, accumulated in a single pass.
#[derive(Debug, Default, Clone)]
pub struct GrainTotals {
    pub net_sales: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub items_sold: f64,
    pub gmv: f64,
    pub returns_value: f64,
    pub return_units_abs: f64,
    pub returns_cogs: f64,
    sale_invoices: HashSet<String>,
    sale_customers: HashSet<String>,
    return_invoices: HashSet<String>,
    pub first_ts: Option<NaiveDateTime>,
    pub last_ts: Option<NaiveDateTime>,
}

impl GrainTotals {
    fn absorb(&mut self, line: &TransactionLine) {
        self.net_sales += line.sales;
        self.cogs_net += line.cogs;
        self.gp_net += line.gross_profit;

        if line.is_return {
            self.returns_value += line.sales.abs();
            self.return_units_abs += line.quantity.abs();
            self.returns_cogs += line.cogs.abs();
            self.return_invoices.insert(line.invoice_id.clone());
        } else {
            self.items_sold += line.quantity;
            self.gmv += line.sales;
            self.sale_invoices.insert(line.invoice_id.clone());
            if let Some(customer) = &line.customer_id {
                self.sale_customers.insert(customer.clone());
            }
        }

        self.first_ts = Some(match self.first_ts {
            Some(ts) if ts <= line.timestamp => ts,
            _ => line.timestamp,
        });
        self.last_ts = Some(match self.last_ts {
            Some(ts) if ts >= line.timestamp => ts,
            _ => line.timestamp,
        });
    }

    /// Distinct sale invoices.
    pub fn orders(&self) -> u64 {
        self.sale_invoices.len() as u64
    }

    /// Distinct non-null buyers on sale lines.
    pub fn buyers(&self) -> u64 {
        self.sale_customers.len() as u64
    }

    /// Distinct return invoices (credit notes).
    pub fn credit_notes(&self) -> u64 {
        self.return_invoices.len() as u64
    }
}

/// Fold the transaction slice into per-key totals. Rows for which the key
/// function returns `None` are skipped (e.g. anonymous lines in customer
/// grains). `BTreeMap` keeps the output deterministically ordered.
pub fn fold_by<K, F>(tx: &[TransactionLine], key_fn: F) -> BTreeMap<K, GrainTotals>
where
    K: Ord,
    F: Fn(&TransactionLine) -> Option<K>,
{
    let mut groups: BTreeMap<K, GrainTotals> = BTreeMap::new();
    for line in tx {
        if let Some(key) = key_fn(line) {
            groups.entry(key).or_default().absorb(line);
        }
    }
    groups
}

/// One row of a monthly grain table. `dimension` is `None` for the company
/// grain; otherwise it holds the raw key value (country, product code or
/// customer id).
#[derive(Debug, Clone)]
pub struct MonthlyMetricRow {
    pub period: NaiveDate,
    pub year_month: String,
    pub dimension: Option<String>,
    pub orders: u64,
    pub customers: u64,
    pub items_sold: f64,
    pub gmv: f64,
    pub returns_value: f64,
    pub return_units_abs: f64,
    pub net_sales: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub gross_margin_pct: Option<f64>,
    /// net_sales / orders; 0.0 when there are no orders (meaningful zero).
    pub aov: f64,
    pub return_rate_value: Option<f64>,
    pub return_rate_units: Option<f64>,
    pub net_sales_mom: Option<f64>,
    pub net_sales_share: Option<f64>,
}

/// Lifetime rollup per dimension key, plus the observed period bounds.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub dimension: String,
    pub description: Option<String>,
    pub first_period: Option<String>,
    pub last_period: Option<String>,
    pub orders: u64,
    pub buyers: u64,
    pub items_sold: f64,
    pub return_units_abs: f64,
    pub gmv: f64,
    pub returns_value: f64,
    pub net_sales: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub gross_margin_pct: Option<f64>,
    pub return_rate_value: Option<f64>,
    pub return_rate_units: Option<f64>,
    pub net_sales_share_total: Option<f64>,
}

fn base_monthly_row(
    dimension: Option<String>,
    year_month: &str,
    totals: &GrainTotals,
) -> crate::Result<MonthlyMetricRow> {
    let orders = totals.orders();
    Ok(MonthlyMetricRow {
        period: period_from_year_month(year_month)?,
        year_month: year_month.to_string(),
        dimension,
        orders,
        customers: totals.buyers(),
        items_sold: totals.items_sold,
        gmv: totals.gmv,
        returns_value: totals.returns_value,
        return_units_abs: totals.return_units_abs,
        net_sales: totals.net_sales,
        cogs_net: totals.cogs_net,
        gp_net: totals.gp_net,
        gross_margin_pct: safe_div(totals.gp_net, totals.net_sales),
        aov: safe_div(totals.net_sales, orders as f64).unwrap_or(0.0),
        return_rate_value: safe_div(totals.returns_value, totals.gmv),
        return_rate_units: safe_div(totals.return_units_abs, totals.items_sold),
        net_sales_mom: None,
        net_sales_share: None,
    })
}

/// Fill month-over-month per dimension. Rows must already be sorted by
/// (dimension, period); the first period of each dimension stays `None`.
fn fill_month_over_month(rows: &mut [MonthlyMetricRow]) {
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        while end < rows.len() && rows[end].dimension == rows[start].dimension {
            end += 1;
        }
        let series: Vec<f64> = rows[start..end].iter().map(|r| r.net_sales).collect();
        for (row, mom) in rows[start..end].iter_mut().zip(month_over_month(&series)) {
            row.net_sales_mom = mom;
        }
        start = end;
    }
}

/// Fill each row's share of its month's total net sales.
fn fill_monthly_share(rows: &mut [MonthlyMetricRow]) {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in rows.iter() {
        *totals.entry(row.year_month.clone()).or_default() += row.net_sales;
    }
    for row in rows.iter_mut() {
        row.net_sales_share = share_of_total(row.net_sales, totals[&row.year_month]);
    }
}

fn dimension_monthly<F>(
    tx: &[TransactionLine],
    key_fn: F,
    with_share: bool,
) -> crate::Result<Vec<MonthlyMetricRow>>
where
    F: Fn(&TransactionLine) -> Option<String>,
{
    let groups = fold_by(tx, |line| {
        key_fn(line).map(|dim| (dim, line.year_month.clone()))
    });
    let mut rows = Vec::with_capacity(groups.len());
    for ((dim, ym), totals) in &groups {
        rows.push(base_monthly_row(Some(dim.clone()), ym, totals)?);
    }
    // BTreeMap order over (dimension, "YYYY-MM") is already the required
    // (dimension, period) sort.
    fill_month_over_month(&mut rows);
    if with_share {
        fill_monthly_share(&mut rows);
    }
    Ok(rows)
}

/// Company grain: one row per month across the whole ledger.
pub fn company_monthly(tx: &[TransactionLine]) -> crate::Result<Vec<MonthlyMetricRow>> {
    let groups = fold_by(tx, |line| Some(line.year_month.clone()));
    let mut rows = Vec::with_capacity(groups.len());
    for (ym, totals) in &groups {
        rows.push(base_monthly_row(None, ym, totals)?);
    }
    fill_month_over_month(&mut rows);
    Ok(rows)
}

/// Country grain by month. A missing country is bucketed under the
/// configured "Unspecified" label before grouping so null never becomes its
/// own silent group.
pub fn country_monthly(
    tx: &[TransactionLine],
    cfg: &EngineConfig,
) -> crate::Result<Vec<MonthlyMetricRow>> {
    dimension_monthly(
        tx,
        |line| {
            Some(
                line.country
                    .clone()
                    .unwrap_or_else(|| cfg.unspecified_label.clone()),
            )
        },
        true,
    )
}

/// Product grain by month.
pub fn product_monthly(tx: &[TransactionLine]) -> crate::Result<Vec<MonthlyMetricRow>> {
    dimension_monthly(tx, |line| Some(line.product_code.clone()), false)
}

/// Customer grain by month. Anonymous lines are excluded here but stay in
/// the company, country and product grains.
pub fn customer_monthly(tx: &[TransactionLine]) -> crate::Result<Vec<MonthlyMetricRow>> {
    dimension_monthly(tx, |line| line.customer_id.clone(), false)
}

/// Observed (first, last) month per dimension from an already-built monthly
/// table.
fn period_bounds(monthly: &[MonthlyMetricRow]) -> HashMap<String, (String, String)> {
    let mut bounds: HashMap<String, (String, String)> = HashMap::new();
    for row in monthly {
        let Some(dim) = &row.dimension else { continue };
        bounds
            .entry(dim.clone())
            .and_modify(|(first, last)| {
                if row.year_month < *first {
                    *first = row.year_month.clone();
                }
                if row.year_month > *last {
                    *last = row.year_month.clone();
                }
            })
            .or_insert_with(|| (row.year_month.clone(), row.year_month.clone()));
    }
    bounds
}

fn snapshot_rows<F>(
    tx: &[TransactionLine],
    monthly: &[MonthlyMetricRow],
    key_fn: F,
    descriptions: Option<&HashMap<String, String>>,
    with_share_total: bool,
) -> Vec<SnapshotRow>
where
    F: Fn(&TransactionLine) -> Option<String>,
{
    let groups = fold_by(tx, key_fn);
    let bounds = period_bounds(monthly);

    let positive_total: f64 = groups.values().map(|t| t.net_sales.max(0.0)).sum();

    let mut rows: Vec<SnapshotRow> = groups
        .iter()
        .map(|(dim, totals)| {
            let (first, last) = match bounds.get(dim) {
                Some((f, l)) => (Some(f.clone()), Some(l.clone())),
                None => (None, None),
            };
            SnapshotRow {
                dimension: dim.clone(),
                description: descriptions.and_then(|d| d.get(dim).cloned()),
                first_period: first,
                last_period: last,
                orders: totals.orders(),
                buyers: totals.buyers(),
                items_sold: totals.items_sold,
                return_units_abs: totals.return_units_abs,
                gmv: totals.gmv,
                returns_value: totals.returns_value,
                net_sales: totals.net_sales,
                cogs_net: totals.cogs_net,
                gp_net: totals.gp_net,
                gross_margin_pct: safe_div(totals.gp_net, totals.net_sales),
                return_rate_value: safe_div(totals.returns_value, totals.gmv),
                return_rate_units: safe_div(totals.return_units_abs, totals.items_sold),
                net_sales_share_total: if with_share_total {
                    share_of_total(totals.net_sales.max(0.0), positive_total)
                } else {
                    None
                },
            }
        })
        .collect();

    rows.sort_by(|a, b| b.net_sales.total_cmp(&a.net_sales));
    rows
}

/// Country lifetime snapshot, sorted by net sales descending.
pub fn country_snapshot(
    tx: &[TransactionLine],
    country_monthly: &[MonthlyMetricRow],
    cfg: &EngineConfig,
) -> Vec<SnapshotRow> {
    snapshot_rows(
        tx,
        country_monthly,
        |line| {
            Some(
                line.country
                    .clone()
                    .unwrap_or_else(|| cfg.unspecified_label.clone()),
            )
        },
        None,
        true,
    )
}

/// Most frequent description per product; ties resolve to the lexically
/// smallest so the output is deterministic.
fn description_modes(tx: &[TransactionLine]) -> HashMap<String, String> {
    let mut counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
    for line in tx {
        if let Some(desc) = &line.description {
            *counts
                .entry(line.product_code.clone())
                .or_default()
                .entry(desc.clone())
                .or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter_map(|(code, by_desc)| {
            by_desc
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(desc, _)| (code, desc))
        })
        .collect()
}

/// Product lifetime snapshot, sorted by net sales descending.
pub fn product_snapshot(
    tx: &[TransactionLine],
    product_monthly: &[MonthlyMetricRow],
) -> Vec<SnapshotRow> {
    let descriptions = description_modes(tx);
    snapshot_rows(
        tx,
        product_monthly,
        |line| Some(line.product_code.clone()),
        Some(&descriptions),
        false,
    )
}

/// Per-customer lifetime snapshot feeding the lifecycle analyzer.
#[derive(Debug, Clone)]
pub struct CustomerSnapshot {
    pub customer_id: String,
    pub first_purchase: NaiveDateTime,
    pub last_purchase: NaiveDateTime,
    /// Days between the reference date and the last purchase.
    pub recency_days: i64,
    pub tenure_days: i64,
    /// Distinct sale orders (RFM frequency).
    pub frequency: u64,
    /// Lifetime net sales (RFM monetary).
    pub monetary: f64,
    pub items_sold: f64,
    pub gmv: f64,
    pub returns_value: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub aov: f64,
    pub gross_margin_pct: Option<f64>,
}

/// Build customer lifetime snapshots. The recency reference date is the
/// configured `as_of` or, when absent, the maximum timestamp in the input.
pub fn customer_snapshot(tx: &[TransactionLine], cfg: &EngineConfig) -> Vec<CustomerSnapshot> {
    let as_of = cfg.as_of.unwrap_or_else(|| {
        tx.iter()
            .map(|line| line.timestamp.date())
            .max()
            .unwrap_or_default()
    });

    let groups = fold_by(tx, |line| line.customer_id.clone());
    groups
        .into_iter()
        .filter_map(|(customer_id, totals)| {
            let first = totals.first_ts?;
            let last = totals.last_ts?;
            let orders = totals.orders();
            Some(CustomerSnapshot {
                customer_id,
                first_purchase: first,
                last_purchase: last,
                recency_days: (as_of - last.date()).num_days(),
                tenure_days: (last.date() - first.date()).num_days(),
                frequency: orders,
                monetary: totals.net_sales,
                items_sold: totals.items_sold,
                gmv: totals.gmv,
                returns_value: totals.returns_value,
                cogs_net: totals.cogs_net,
                gp_net: totals.gp_net,
                aov: safe_div(totals.net_sales, orders as f64).unwrap_or(0.0),
                gross_margin_pct: safe_div(totals.gp_net, totals.net_sales),
            })
        })
        .collect()
}

/// Single-row lifetime rollup of the company monthly table.
#[derive(Debug, Clone)]
pub struct ExecutiveSummary {
    pub first_period: String,
    pub last_period: String,
    pub months: u64,
    pub orders: u64,
    pub customers: u64,
    pub items_sold: f64,
    pub gmv: f64,
    pub returns_value: f64,
    pub net_sales: f64,
    pub cogs_net: f64,
    pub gp_net: f64,
    pub gross_margin_pct: Option<f64>,
}

pub fn executive_summary(company: &[MonthlyMetricRow]) -> crate::Result<ExecutiveSummary> {
    let first = company
        .first()
        .ok_or_else(|| anyhow::anyhow!("company monthly table is empty"))?;
    let last = company.last().expect("non-empty checked above");

    let net_sales: f64 = company.iter().map(|r| r.net_sales).sum();
    let gp_net: f64 = company.iter().map(|r| r.gp_net).sum();
    Ok(ExecutiveSummary {
        first_period: first.year_month.clone(),
        last_period: last.year_month.clone(),
        months: company.len() as u64,
        orders: company.iter().map(|r| r.orders).sum(),
        customers: company.iter().map(|r| r.customers).sum(),
        items_sold: company.iter().map(|r| r.items_sold).sum(),
        gmv: company.iter().map(|r| r.gmv).sum(),
        returns_value: company.iter().map(|r| r.returns_value).sum(),
        net_sales,
        cogs_net: company.iter().map(|r| r.cogs_net).sum(),
        gp_net,
        gross_margin_pct: safe_div(gp_net, net_sales),
    })
}

/// Company-level monthly returns detail.
#[derive(Debug, Clone)]
pub struct ReturnsMonthlyRow {
    pub period: NaiveDate,
    pub year_month: String,
    pub units_sold: f64,
    pub gmv: f64,
    pub orders: u64,
    pub return_units_abs: f64,
    pub returns_value: f64,
    pub returns_cogs: f64,
    /// Distinct return invoices.
    pub credit_notes: u64,
    pub return_rate_units: Option<f64>,
    pub return_rate_value: Option<f64>,
}

pub fn returns_monthly(tx: &[TransactionLine]) -> crate::Result<Vec<ReturnsMonthlyRow>> {
    let groups = fold_by(tx, |line| Some(line.year_month.clone()));
    let mut rows = Vec::with_capacity(groups.len());
    for (ym, totals) in &groups {
        rows.push(ReturnsMonthlyRow {
            period: period_from_year_month(ym)?,
            year_month: ym.clone(),
            units_sold: totals.items_sold,
            gmv: totals.gmv,
            orders: totals.orders(),
            return_units_abs: totals.return_units_abs,
            returns_value: totals.returns_value,
            returns_cogs: totals.returns_cogs,
            credit_notes: totals.credit_notes(),
            return_rate_units: safe_div(totals.return_units_abs, totals.items_sold),
            return_rate_value: safe_div(totals.returns_value, totals.gmv),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn line(
        invoice: &str,
        product: &str,
        qty: f64,
        when: NaiveDateTime,
        price: f64,
        cost: f64,
        customer: Option<&str>,
        country: Option<&str>,
    ) -> TransactionLine {
        TransactionLine::new(
            invoice,
            product,
            Some(format!("{product} desc")),
            qty,
            when,
            price,
            cost,
            customer.map(str::to_string),
            country.map(str::to_string),
        )
    }

    /// Fixture: C1 buys 5 units of A in Jan, returns 2 and buys 2 more in
    /// Feb; C3 buys B in Feb (UK); C2 buys B in Jan (France); one anonymous
    /// line with no country in Jan.
    fn sample_tx() -> Vec<TransactionLine> {
        vec![
            line("100", "A", 5.0, ts(2021, 1, 5), 20.0, 12.0, Some("C1"), Some("UK")),
            line("101", "A", -2.0, ts(2021, 2, 2), 20.0, 12.0, Some("C1"), Some("UK")),
            line("102", "A", 2.0, ts(2021, 2, 10), 20.0, 12.0, Some("C1"), Some("UK")),
            line("103", "B", 3.0, ts(2021, 2, 11), 30.0, 15.0, Some("C3"), Some("UK")),
            line("104", "B", 1.0, ts(2021, 1, 15), 30.0, 15.0, Some("C2"), Some("France")),
            line("105", "C", 4.0, ts(2021, 1, 20), 25.0, 10.0, None, None),
        ]
    }

    #[test]
    fn test_company_monthly_totals() {
        let rows = company_monthly(&sample_tx()).unwrap();
        assert_eq!(rows.len(), 2);

        let jan = &rows[0];
        assert_eq!(jan.year_month, "2021-01");
        assert_eq!(jan.orders, 3);
        assert_eq!(jan.customers, 2); // anonymous buyer not counted
        assert!((jan.items_sold - 10.0).abs() < 1e-9);
        assert!((jan.gmv - 230.0).abs() < 1e-9);
        assert!((jan.returns_value - 0.0).abs() < 1e-9);
        assert!((jan.net_sales - 230.0).abs() < 1e-9);
        assert_eq!(jan.net_sales_mom, None);

        let feb = &rows[1];
        assert_eq!(feb.orders, 2); // return invoice 101 excluded
        assert!((feb.gmv - 130.0).abs() < 1e-9);
        assert!((feb.returns_value - 40.0).abs() < 1e-9);
        assert!((feb.net_sales - 90.0).abs() < 1e-9);
        assert!((feb.aov - 45.0).abs() < 1e-9);
        let mom = feb.net_sales_mom.unwrap();
        assert!((mom - (90.0 - 230.0) / 230.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_identity_invariants() {
        for row in company_monthly(&sample_tx()).unwrap() {
            assert!((row.net_sales - (row.gmv - row.returns_value)).abs() < 0.01);
            assert!((row.gp_net - (row.net_sales - row.cogs_net)).abs() < 0.01);
        }
    }

    #[test]
    fn test_country_monthly_unspecified_bucket_and_share() {
        let cfg = EngineConfig::default();
        let rows = country_monthly(&sample_tx(), &cfg).unwrap();

        let unspecified: Vec<_> = rows
            .iter()
            .filter(|r| r.dimension.as_deref() == Some("Unspecified"))
            .collect();
        assert_eq!(unspecified.len(), 1);
        assert!((unspecified[0].net_sales - 100.0).abs() < 1e-9);

        // Shares within one month sum to 1.
        let jan_share: f64 = rows
            .iter()
            .filter(|r| r.year_month == "2021-01")
            .map(|r| r.net_sales_share.unwrap())
            .sum();
        assert!((jan_share - 1.0).abs() < 1e-9);

        let feb_uk = rows
            .iter()
            .find(|r| r.dimension.as_deref() == Some("UK") && r.year_month == "2021-02")
            .unwrap();
        assert!((feb_uk.return_units_abs - 2.0).abs() < 1e-9);
        // Feb UK sold units = 2 + 3 = 5, returned 2 -> 0.4
        assert!((feb_uk.return_rate_units.unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_returns_only_month_has_zero_aov_and_null_return_rate() {
        // France: one return in Feb, no sales that month.
        let mut tx = sample_tx();
        tx.push(line(
            "106",
            "B",
            -1.0,
            ts(2021, 2, 20),
            30.0,
            15.0,
            Some("C2"),
            Some("France"),
        ));
        let cfg = EngineConfig::default();
        let rows = country_monthly(&tx, &cfg).unwrap();
        let feb_fr = rows
            .iter()
            .find(|r| r.dimension.as_deref() == Some("France") && r.year_month == "2021-02")
            .unwrap();
        assert_eq!(feb_fr.orders, 0);
        assert_eq!(feb_fr.aov, 0.0);
        assert_eq!(feb_fr.return_rate_value, None); // gmv is 0
        assert!((feb_fr.returns_value - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_country_snapshot_buyers_distinct() {
        let cfg = EngineConfig::default();
        let tx = sample_tx();
        let monthly = country_monthly(&tx, &cfg).unwrap();
        let snap = country_snapshot(&tx, &monthly, &cfg);
        let uk = snap.iter().find(|r| r.dimension == "UK").unwrap();
        assert_eq!(uk.buyers, 2);
        assert_eq!(uk.first_period.as_deref(), Some("2021-01"));
        assert_eq!(uk.last_period.as_deref(), Some("2021-02"));
    }

    #[test]
    fn test_product_snapshot_single_buyer() {
        let tx = sample_tx();
        let monthly = product_monthly(&tx).unwrap();
        let snap = product_snapshot(&tx, &monthly);
        let a = snap.iter().find(|r| r.dimension == "A").unwrap();
        // Only C1 ever bought product A, across two invoices.
        assert_eq!(a.buyers, 1);
        assert_eq!(a.orders, 2);
        assert_eq!(a.description.as_deref(), Some("A desc"));
    }

    #[test]
    fn test_customer_monthly_c1_february() {
        let rows = customer_monthly(&sample_tx()).unwrap();
        let feb_c1 = rows
            .iter()
            .find(|r| r.dimension.as_deref() == Some("C1") && r.year_month == "2021-02")
            .unwrap();
        assert_eq!(feb_c1.orders, 1);
        assert!((feb_c1.items_sold - 2.0).abs() < 1e-9);
        assert!((feb_c1.returns_value - 40.0).abs() < 1e-9);
        assert!((feb_c1.gmv - 40.0).abs() < 1e-9);
        assert!(feb_c1.net_sales.abs() < 1e-9);

        // Anonymous line produced no customer row.
        assert!(rows.iter().all(|r| r.dimension.is_some()));
    }

    #[test]
    fn test_customer_snapshot_recency() {
        let cfg = EngineConfig {
            as_of: NaiveDate::from_ymd_opt(2021, 3, 1),
            ..EngineConfig::default()
        };
        let snaps = customer_snapshot(&sample_tx(), &cfg);
        let c1 = snaps.iter().find(|s| s.customer_id == "C1").unwrap();
        // C1's latest line is invoice 102 on 2021-02-10.
        assert_eq!(c1.last_purchase.date(), NaiveDate::from_ymd_opt(2021, 2, 10).unwrap());
        assert_eq!(c1.recency_days, 19);
        assert_eq!(c1.frequency, 2);
        assert!((c1.monetary - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_executive_summary_sums_company_rows() {
        let company = company_monthly(&sample_tx()).unwrap();
        let summary = executive_summary(&company).unwrap();
        assert_eq!(summary.first_period, "2021-01");
        assert_eq!(summary.last_period, "2021-02");
        assert_eq!(summary.months, 2);
        assert_eq!(summary.orders, 5);
        assert!((summary.net_sales - 320.0).abs() < 1e-9);
        assert!((summary.gmv - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_returns_monthly_credit_notes() {
        let rows = returns_monthly(&sample_tx()).unwrap();
        let feb = rows.iter().find(|r| r.year_month == "2021-02").unwrap();
        assert_eq!(feb.credit_notes, 1);
        assert!((feb.returns_value - 40.0).abs() < 1e-9);
        assert!((feb.returns_cogs - 24.0).abs() < 1e-9);
        assert!((feb.return_rate_units.unwrap() - 2.0 / 5.0).abs() < 1e-9);
    }
}
