//! Table handoff to the persistence collaborator.
//!
//! Each named table is written exactly once as a flat CSV file. Monetary
//! values and unit counts are rounded to 2 decimal places and ratios to 4
//! at this boundary; in-memory values stay unrounded. A `None` ratio
//! serializes as an empty cell, never as zero.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use crate::abc::AbcRow;
use crate::aggregate::{ExecutiveSummary, MonthlyMetricRow, ReturnsMonthlyRow, SnapshotRow};
use crate::lifecycle::CustomerKpiRow;
use crate::retention::RetentionCohortRow;

/// The full, internally-consistent output of one engine run.
#[derive(Debug, Clone)]
pub struct TableSet {
    pub company_monthly: Vec<MonthlyMetricRow>,
    pub country_monthly: Vec<MonthlyMetricRow>,
    pub country_snapshot: Vec<SnapshotRow>,
    pub product_monthly: Vec<MonthlyMetricRow>,
    pub product_snapshot: Vec<SnapshotRow>,
    pub product_abc: Vec<AbcRow>,
    pub customer_monthly: Vec<MonthlyMetricRow>,
    pub customer_kpis: Vec<CustomerKpiRow>,
    pub customer_retention_monthly: Vec<RetentionCohortRow>,
    pub executive_summary: ExecutiveSummary,
    pub returns_monthly: Vec<ReturnsMonthlyRow>,
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn ratio(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn datetime(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn open_writer(dir: &Path, name: &str) -> crate::Result<(csv::Writer<fs::File>, PathBuf)> {
    let path = dir.join(format!("{name}.csv"));
    let writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    Ok((writer, path))
}

fn write_company_monthly(dir: &Path, rows: &[MonthlyMetricRow]) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "company_monthly")?;
    w.write_record([
        "period",
        "year_month",
        "orders",
        "customers",
        "items_sold",
        "gmv",
        "returns_value",
        "return_rate_value",
        "net_sales",
        "cogs_net",
        "gp_net",
        "gross_margin_pct",
        "net_sales_mom",
        "aov",
    ])?;
    for r in rows {
        w.write_record([
            date(r.period),
            r.year_month.clone(),
            r.orders.to_string(),
            r.customers.to_string(),
            money(r.items_sold),
            money(r.gmv),
            money(r.returns_value),
            ratio(r.return_rate_value),
            money(r.net_sales),
            money(r.cogs_net),
            money(r.gp_net),
            ratio(r.gross_margin_pct),
            ratio(r.net_sales_mom),
            money(r.aov),
        ])?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote company_monthly");
    Ok(())
}

fn write_dimension_monthly(
    dir: &Path,
    name: &str,
    dimension_column: &str,
    with_share: bool,
    rows: &[MonthlyMetricRow],
) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, name)?;
    let mut header = vec![
        "period",
        "year_month",
        dimension_column,
        "orders",
        "customers",
        "items_sold",
        "gmv",
        "returns_value",
        "return_units_abs",
        "net_sales",
        "cogs_net",
        "gp_net",
        "gross_margin_pct",
    ];
    if with_share {
        header.push("net_sales_share");
    }
    header.extend(["net_sales_mom", "aov", "return_rate_value", "return_rate_units"]);
    w.write_record(&header)?;
    for r in rows {
        let mut record = vec![
            date(r.period),
            r.year_month.clone(),
            r.dimension.clone().unwrap_or_default(),
            r.orders.to_string(),
            r.customers.to_string(),
            money(r.items_sold),
            money(r.gmv),
            money(r.returns_value),
            money(r.return_units_abs),
            money(r.net_sales),
            money(r.cogs_net),
            money(r.gp_net),
            ratio(r.gross_margin_pct),
        ];
        if with_share {
            record.push(ratio(r.net_sales_share));
        }
        record.extend([
            ratio(r.net_sales_mom),
            money(r.aov),
            ratio(r.return_rate_value),
            ratio(r.return_rate_units),
        ]);
        w.write_record(&record)?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote {name}");
    Ok(())
}

fn write_snapshot(
    dir: &Path,
    name: &str,
    dimension_column: &str,
    with_description: bool,
    with_share_total: bool,
    rows: &[SnapshotRow],
) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, name)?;
    let mut header = vec![dimension_column];
    if with_description {
        header.push("description");
    }
    header.extend([
        "first_period",
        "last_period",
        "orders",
        "buyers",
        "items_sold",
        "return_units_abs",
        "gmv",
        "returns_value",
        "net_sales",
        "cogs_net",
        "gp_net",
        "gross_margin_pct",
        "return_rate_value",
        "return_rate_units",
    ]);
    if with_share_total {
        header.push("net_sales_share_total");
    }
    w.write_record(&header)?;
    for r in rows {
        let mut record = vec![r.dimension.clone()];
        if with_description {
            record.push(r.description.clone().unwrap_or_default());
        }
        record.extend([
            r.first_period.clone().unwrap_or_default(),
            r.last_period.clone().unwrap_or_default(),
            r.orders.to_string(),
            r.buyers.to_string(),
            money(r.items_sold),
            money(r.return_units_abs),
            money(r.gmv),
            money(r.returns_value),
            money(r.net_sales),
            money(r.cogs_net),
            money(r.gp_net),
            ratio(r.gross_margin_pct),
            ratio(r.return_rate_value),
            ratio(r.return_rate_units),
        ]);
        if with_share_total {
            record.push(ratio(r.net_sales_share_total));
        }
        w.write_record(&record)?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote {name}");
    Ok(())
}

fn write_product_abc(dir: &Path, rows: &[AbcRow]) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "product_abc")?;
    w.write_record(["product_code", "abc", "cum_share_net_sales"])?;
    for r in rows {
        w.write_record([
            r.product_code.clone(),
            r.tier.to_string(),
            ratio(Some(r.cum_share_net_sales)),
        ])?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote product_abc");
    Ok(())
}

fn write_customer_kpis(dir: &Path, rows: &[CustomerKpiRow]) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "customer_kpis")?;
    w.write_record([
        "customer_id",
        "first_purchase",
        "last_purchase",
        "recency_days",
        "tenure_days",
        "churn_risk",
        "gmv",
        "returns_value",
        "net_sales",
        "cogs_net",
        "gp_net",
        "orders",
        "items_sold",
        "aov",
        "frequency",
        "monetary",
        "gross_margin_pct",
        "r_score",
        "f_score",
        "m_score",
        "rfm_score",
        "segment",
        "clv_monthly_avg",
        "clv_estimate",
    ])?;
    for r in rows {
        w.write_record([
            r.customer_id.clone(),
            datetime(r.first_purchase),
            datetime(r.last_purchase),
            r.recency_days.to_string(),
            r.tenure_days.to_string(),
            r.churn_risk.as_str().to_string(),
            money(r.gmv),
            money(r.returns_value),
            money(r.net_sales),
            money(r.cogs_net),
            money(r.gp_net),
            r.orders.to_string(),
            money(r.items_sold),
            money(r.aov),
            r.frequency.to_string(),
            money(r.monetary),
            ratio(r.gross_margin_pct),
            r.r_score.to_string(),
            r.f_score.to_string(),
            r.m_score.to_string(),
            r.rfm_score.to_string(),
            r.segment.to_string(),
            money(r.clv_monthly_avg),
            money(r.clv_estimate),
        ])?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote customer_kpis");
    Ok(())
}

fn write_retention(dir: &Path, rows: &[RetentionCohortRow]) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "customer_retention_monthly")?;
    w.write_record([
        "period",
        "year_month",
        "active_customers",
        "new_customers",
        "retained",
        "reactivated",
        "churned",
    ])?;
    for r in rows {
        w.write_record([
            date(r.period),
            r.year_month.clone(),
            r.active_customers.to_string(),
            r.new_customers.to_string(),
            r.retained.to_string(),
            r.reactivated.to_string(),
            r.churned.to_string(),
        ])?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote customer_retention_monthly");
    Ok(())
}

fn write_executive_summary(dir: &Path, summary: &ExecutiveSummary) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "executive_summary")?;
    w.write_record([
        "first_period",
        "last_period",
        "months",
        "orders",
        "customers",
        "items_sold",
        "gmv",
        "returns_value",
        "net_sales",
        "cogs_net",
        "gp_net",
        "gross_margin_pct",
    ])?;
    w.write_record([
        summary.first_period.clone(),
        summary.last_period.clone(),
        summary.months.to_string(),
        summary.orders.to_string(),
        summary.customers.to_string(),
        money(summary.items_sold),
        money(summary.gmv),
        money(summary.returns_value),
        money(summary.net_sales),
        money(summary.cogs_net),
        money(summary.gp_net),
        ratio(summary.gross_margin_pct),
    ])?;
    w.flush()?;
    info!(rows = 1, path = %path.display(), "wrote executive_summary");
    Ok(())
}

fn write_returns_monthly(dir: &Path, rows: &[ReturnsMonthlyRow]) -> crate::Result<()> {
    let (mut w, path) = open_writer(dir, "returns_monthly")?;
    w.write_record([
        "period",
        "year_month",
        "units_sold",
        "gmv",
        "orders",
        "return_units_abs",
        "returns_value",
        "returns_cogs",
        "credit_notes",
        "return_rate_units",
        "return_rate_value",
    ])?;
    for r in rows {
        w.write_record([
            date(r.period),
            r.year_month.clone(),
            money(r.units_sold),
            money(r.gmv),
            r.orders.to_string(),
            money(r.return_units_abs),
            money(r.returns_value),
            money(r.returns_cogs),
            r.credit_notes.to_string(),
            ratio(r.return_rate_units),
            ratio(r.return_rate_value),
        ])?;
    }
    w.flush()?;
    info!(rows = rows.len(), path = %path.display(), "wrote returns_monthly");
    Ok(())
}

/// Write every table into `out_dir`, creating it if needed. Each table is
/// written exactly once; there is no partial-write mode.
pub fn write_tables(tables: &TableSet, out_dir: &Path) -> crate::Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory '{}'", out_dir.display()))?;

    write_company_monthly(out_dir, &tables.company_monthly)?;
    write_dimension_monthly(
        out_dir,
        "country_monthly",
        "country",
        true,
        &tables.country_monthly,
    )?;
    write_snapshot(
        out_dir,
        "country_snapshot",
        "country",
        false,
        true,
        &tables.country_snapshot,
    )?;
    write_dimension_monthly(
        out_dir,
        "product_monthly",
        "product_code",
        false,
        &tables.product_monthly,
    )?;
    write_snapshot(
        out_dir,
        "product_snapshot",
        "product_code",
        true,
        false,
        &tables.product_snapshot,
    )?;
    write_product_abc(out_dir, &tables.product_abc)?;
    write_dimension_monthly(
        out_dir,
        "customer_monthly",
        "customer_id",
        false,
        &tables.customer_monthly,
    )?;
    write_customer_kpis(out_dir, &tables.customer_kpis)?;
    write_retention(out_dir, &tables.customer_retention_monthly)?;
    write_executive_summary(out_dir, &tables.executive_summary)?;
    write_returns_monthly(out_dir, &tables.returns_monthly)?;
    Ok(())
}
