//! KPIForge: turns a cleaned, line-level retail transaction ledger into
//! internally-consistent KPI tables at company, country, product and
//! customer grains, plus customer-lifecycle analytics (RFM, CLV, churn risk),
//! a monthly cohort-retention classification and an ABC product tiering.
//!
//! The engine is a single-shot batch transform: every table is a pure
//! function of the same immutable transaction slice, and either the full
//! set of tables is produced or the run aborts with one specific
//! input-contract error.

pub mod abc;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod lifecycle;
pub mod metrics;
pub mod output;
pub mod qc;
pub mod retention;

// Re-export public items for easier access
pub use abc::{classify_abc, AbcRow};
pub use aggregate::{MonthlyMetricRow, SnapshotRow};
pub use cli::Args;
pub use config::EngineConfig;
pub use data::{load_transactions, read_transactions, TransactionLine};
pub use lifecycle::CustomerKpiRow;
pub use output::TableSet;
pub use qc::{reconcile_net_sales, QcReport};
pub use retention::RetentionCohortRow;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

/// Build the full set of output tables from a validated transaction slice.
///
/// Each table is computed independently from the same immutable input;
/// only the retention walk and the per-dimension month-over-month series
/// carry ordering requirements, and those are handled internally.
pub fn build_tables(tx: &[TransactionLine], cfg: &EngineConfig) -> Result<TableSet> {
    if tx.is_empty() {
        anyhow::bail!("transaction table is empty; nothing to aggregate");
    }

    let company_monthly = aggregate::company_monthly(tx)?;
    let country_monthly = aggregate::country_monthly(tx, cfg)?;
    let country_snapshot = aggregate::country_snapshot(tx, &country_monthly, cfg);
    let product_monthly = aggregate::product_monthly(tx)?;
    let product_snapshot = aggregate::product_snapshot(tx, &product_monthly);
    let product_abc = abc::classify_abc(&product_snapshot, cfg);
    let customer_monthly = aggregate::customer_monthly(tx)?;
    let customer_kpis = lifecycle::build_customer_kpis(tx, &customer_monthly, cfg)?;
    let customer_retention_monthly = retention::monthly_retention(&customer_monthly)?;
    let executive_summary = aggregate::executive_summary(&company_monthly)?;
    let returns_monthly = aggregate::returns_monthly(tx)?;

    Ok(TableSet {
        company_monthly,
        country_monthly,
        country_snapshot,
        product_monthly,
        product_snapshot,
        product_abc,
        customer_monthly,
        customer_kpis,
        customer_retention_monthly,
        executive_summary,
        returns_monthly,
    })
}
