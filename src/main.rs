//! KPIForge: retail KPI aggregation engine
//!
//! This is the main entrypoint that orchestrates ledger loading, table
//! building, reconciliation and the CSV handoff.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kpiforge::{build_tables, load_transactions, output, qc, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let cfg = args.engine_config()?;
    let start = Instant::now();

    let tx = load_transactions(Path::new(&args.input))?;
    info!(rows = tx.len(), input = %args.input, "loaded transaction ledger");

    let tables = build_tables(&tx, &cfg)?;
    info!(
        months = tables.company_monthly.len(),
        countries = tables.country_snapshot.len(),
        products = tables.product_snapshot.len(),
        customers = tables.customer_kpis.len(),
        "built KPI tables"
    );

    // Reconciliation is detection-only; a mismatch is reported by the QC
    // module and the tables are still written for inspection.
    qc::reconcile_net_sales(&tables.company_monthly, &tables.country_monthly, &cfg);

    output::write_tables(&tables, Path::new(&args.out_dir))?;
    info!(
        out_dir = %args.out_dir,
        elapsed_s = start.elapsed().as_secs_f64(),
        "run complete"
    );

    Ok(())
}
