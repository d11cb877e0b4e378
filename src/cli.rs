//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::config::EngineConfig;

/// Retail KPI engine: aggregates a line-level transaction ledger into
/// monthly and lifetime KPI tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transaction CSV file
    #[arg(short, long, default_value = "transactions.csv")]
    pub input: String,

    /// Directory the KPI tables are written into
    #[arg(short, long, default_value = "gold")]
    pub out_dir: String,

    /// Reference date for recency, format YYYY-MM-DD
    /// (defaults to the latest transaction timestamp)
    #[arg(long)]
    pub as_of: Option<String>,

    /// CLV projection horizon in months
    #[arg(long, default_value = "12")]
    pub clv_horizon: u32,

    /// Maximum tolerated company-vs-country net sales gap per month
    #[arg(long, default_value = "1.0")]
    pub qc_threshold: f64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the engine configuration from the parsed flags.
    pub fn engine_config(&self) -> crate::Result<EngineConfig> {
        let as_of = match &self.as_of {
            Some(raw) => {
                let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|_| anyhow::anyhow!("Invalid as-of date '{raw}', expected YYYY-MM-DD"))?;
                Some(parsed)
            }
            None => None,
        };

        Ok(EngineConfig {
            as_of,
            clv_horizon_months: self.clv_horizon,
            reconcile_threshold: self.qc_threshold,
            ..EngineConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            input: "transactions.csv".to_string(),
            out_dir: "gold".to_string(),
            as_of: None,
            clv_horizon: 12,
            qc_threshold: 1.0,
            verbose: false,
        }
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = args().engine_config().unwrap();
        assert_eq!(cfg.as_of, None);
        assert_eq!(cfg.clv_horizon_months, 12);
        assert_eq!(cfg.reconcile_threshold, 1.0);
    }

    #[test]
    fn test_engine_config_parses_as_of() {
        let mut a = args();
        a.as_of = Some(" 2021-12-10 ".to_string());
        let cfg = a.engine_config().unwrap();
        assert_eq!(cfg.as_of, NaiveDate::from_ymd_opt(2021, 12, 10));

        a.as_of = Some("10/12/2021".to_string());
        assert!(a.engine_config().is_err());
    }

    #[test]
    fn test_engine_config_carries_overrides() {
        let mut a = args();
        a.clv_horizon = 6;
        a.qc_threshold = 0.5;
        let cfg = a.engine_config().unwrap();
        assert_eq!(cfg.clv_horizon_months, 6);
        assert_eq!(cfg.reconcile_threshold, 0.5);
    }
}
