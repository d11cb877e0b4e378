//! Canonical transaction table: typed records and CSV ingestion.
//!
//! The loader normalizes legacy header synonyms once (e.g. "InvoiceNo" ->
//! `invoice_id`), validates the input contract up front and reports every
//! missing column by name, then recomputes the derived fields (sales, cogs,
//! gross profit, return flag, month bucket) from the base columns so that
//! the sign of `quantity` stays the single source of truth for sale vs.
//! return classification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Deserialize;
use tracing::debug;

/// One immutable invoice line. Derived fields are computed at construction
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TransactionLine {
    pub invoice_id: String,
    pub product_code: String,
    pub description: Option<String>,
    /// Signed quantity; negative means a return.
    pub quantity: f64,
    pub timestamp: NaiveDateTime,
    pub unit_price: f64,
    pub unit_cost: f64,
    pub customer_id: Option<String>,
    pub country: Option<String>,
    /// quantity * unit_price (retains sign).
    pub sales: f64,
    /// quantity * unit_cost (retains sign).
    pub cogs: f64,
    /// sales - cogs.
    pub gross_profit: f64,
    pub is_return: bool,
    /// "YYYY-MM" month bucket derived from the timestamp.
    pub year_month: String,
}

impl TransactionLine {
    /// Build a line from base fields, deriving the rest.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoice_id: impl Into<String>,
        product_code: impl Into<String>,
        description: Option<String>,
        quantity: f64,
        timestamp: NaiveDateTime,
        unit_price: f64,
        unit_cost: f64,
        customer_id: Option<String>,
        country: Option<String>,
    ) -> Self {
        let sales = quantity * unit_price;
        let cogs = quantity * unit_cost;
        Self {
            invoice_id: invoice_id.into(),
            product_code: product_code.into(),
            description,
            quantity,
            timestamp,
            unit_price,
            unit_cost,
            customer_id,
            country,
            sales,
            cogs,
            gross_profit: sales - cogs,
            is_return: quantity < 0.0,
            year_month: timestamp.format("%Y-%m").to_string(),
        }
    }
}

/// A single input-contract problem, named so callers can report it exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    pub column: String,
    pub reason: String,
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "column '{}': {}", self.column, self.reason)
    }
}

/// Columns that must be present in the input file (after synonym mapping).
const REQUIRED_COLUMNS: &[&str] = &[
    "invoice_id",
    "product_code",
    "quantity",
    "timestamp",
    "unit_price",
    "unit_cost",
];

/// Raw CSV record after header canonicalization. Numeric fields are kept as
/// strings so parse failures can name the offending column and line.
#[derive(Debug, Deserialize)]
struct RawRecord {
    invoice_id: String,
    product_code: String,
    description: Option<String>,
    quantity: String,
    timestamp: String,
    unit_price: String,
    unit_cost: String,
    customer_id: Option<String>,
    country: Option<String>,
}

/// Map a header cell to its canonical column name.
///
/// Legacy synonym mapping happens here, once, instead of being scattered
/// across every table builder.
fn canonical_column(header: &str) -> String {
    let trimmed = header.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "invoice_id" | "invoiceno" | "invoice_no" | "invoice" => "invoice_id",
        "product_code" | "stockcode" | "stock_code" | "sku" => "product_code",
        "description" => "description",
        "quantity" | "qty" => "quantity",
        "timestamp" | "invoicedate" | "invoice_date" | "date" => "timestamp",
        "unit_price" | "unitprice" | "price" => "unit_price",
        "unit_cost" | "unitcost" | "cost" => "unit_cost",
        "customer_id" | "customerid" | "customer" => "customer_id",
        "country" => "country",
        other => return other.to_string(),
    }
    .to_string()
}

/// Check header presence for the required columns.
///
/// Returns one violation per missing column; an empty vector means the
/// contract holds. Derived columns (sales, cogs, gross_profit, is_return,
/// year_month) are recomputed by the loader and may be absent.
pub fn validate_headers(canonical: &[String]) -> Vec<ContractViolation> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|required| !canonical.iter().any(|h| h == *required))
        .map(|required| ContractViolation {
            column: (*required).to_string(),
            reason: "required column is missing".to_string(),
        })
        .collect()
}

fn parse_numeric(raw: &str, column: &str, line: usize) -> crate::Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("column '{column}': invalid numeric value '{raw}' at line {line}"))
}

fn parse_timestamp(raw: &str, line: usize) -> crate::Result<NaiveDateTime> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    anyhow::bail!("column 'timestamp': unparseable date '{trimmed}' at line {line}")
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

/// Read and validate transactions from any CSV reader.
///
/// Fatal errors: missing required columns (all named at once), unparseable
/// dates or numerics (named with line number), or an input that yields no
/// usable rows. Lines with zero quantity, and sale lines with a non-positive
/// price or negative cost, are dropped the way the upstream cleaning step
/// drops them; return lines are always kept.
pub fn read_transactions<R: Read>(reader: R) -> crate::Result<Vec<TransactionLine>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("failed to read CSV header row")?
        .clone();
    let canonical: Vec<String> = headers.iter().map(canonical_column).collect();

    let violations = validate_headers(&canonical);
    if !violations.is_empty() {
        let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        anyhow::bail!("input contract violation: {}", details.join("; "));
    }

    let canonical_headers = StringRecord::from(canonical);

    let mut lines = Vec::new();
    let mut dropped = 0usize;
    for (idx, result) in csv_reader.records().enumerate() {
        // +2: one for the header row, one for 1-based numbering.
        let line_number = idx + 2;
        let record =
            result.with_context(|| format!("malformed CSV record at line {line_number}"))?;
        let raw: RawRecord = record
            .deserialize(Some(&canonical_headers))
            .with_context(|| format!("failed to decode record at line {line_number}"))?;

        let quantity = parse_numeric(&raw.quantity, "quantity", line_number)?;
        let unit_price = parse_numeric(&raw.unit_price, "unit_price", line_number)?;
        let unit_cost = parse_numeric(&raw.unit_cost, "unit_cost", line_number)?;
        let timestamp = parse_timestamp(&raw.timestamp, line_number)?;

        if quantity == 0.0 || !quantity.is_finite() {
            dropped += 1;
            continue;
        }
        let is_sale = quantity > 0.0;
        if is_sale && (unit_price <= 0.0 || unit_cost < 0.0) {
            dropped += 1;
            continue;
        }

        lines.push(TransactionLine::new(
            raw.invoice_id.trim(),
            raw.product_code.trim().to_uppercase(),
            clean_optional(raw.description),
            quantity,
            timestamp,
            unit_price,
            unit_cost,
            clean_optional(raw.customer_id),
            clean_optional(raw.country),
        ));
    }

    if lines.is_empty() {
        anyhow::bail!("no valid transaction rows found in input");
    }
    debug!(rows = lines.len(), dropped, "loaded transaction table");
    Ok(lines)
}

/// Load transactions from a CSV file path.
pub fn load_transactions(path: impl AsRef<Path>) -> crate::Result<Vec<TransactionLine>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    read_transactions(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,UnitCost,CustomerID,Country"
        )
        .unwrap();
        writeln!(
            file,
            "536365,85123a,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00,2.55,1.20,17850,United Kingdom"
        )
        .unwrap();
        writeln!(
            file,
            "C536379,85123A,WHITE HANGING HEART T-LIGHT HOLDER,-2,2010-12-02T09:41:00,2.55,1.20,17850,United Kingdom"
        )
        .unwrap();
        writeln!(file, "536380,22633,HAND WARMER,4,2011-01-04,1.85,0.90,,").unwrap();
        file
    }

    #[test]
    fn test_load_and_derive() {
        let file = create_test_csv();
        let tx = load_transactions(file.path()).unwrap();
        assert_eq!(tx.len(), 3);

        let sale = &tx[0];
        assert_eq!(sale.invoice_id, "536365");
        assert_eq!(sale.product_code, "85123A");
        assert!(!sale.is_return);
        assert!((sale.sales - 15.3).abs() < 1e-9);
        assert!((sale.cogs - 7.2).abs() < 1e-9);
        assert!((sale.gross_profit - 8.1).abs() < 1e-9);
        assert_eq!(sale.year_month, "2010-12");

        let ret = &tx[1];
        assert!(ret.is_return);
        assert!((ret.sales - (-5.1)).abs() < 1e-9);

        let anon = &tx[2];
        assert_eq!(anon.customer_id, None);
        assert_eq!(anon.country, None);
        assert_eq!(anon.year_month, "2011-01");
    }

    #[test]
    fn test_missing_columns_named() {
        let csv = "InvoiceNo,StockCode,Quantity\n1,A,2\n";
        let err = read_transactions(csv.as_bytes()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("input contract violation"));
        assert!(message.contains("timestamp"));
        assert!(message.contains("unit_price"));
        assert!(message.contains("unit_cost"));
    }

    #[test]
    fn test_unparseable_date_names_column_and_line() {
        let csv = "invoice_id,product_code,quantity,timestamp,unit_price,unit_cost\n\
                   1,A,2,not-a-date,1.0,0.5\n";
        let err = read_transactions(csv.as_bytes()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("timestamp"));
        assert!(message.contains("line 2"));
    }

    #[test]
    fn test_invalid_sales_dropped_returns_kept() {
        let csv = "invoice_id,product_code,quantity,timestamp,unit_price,unit_cost\n\
                   1,A,5,2021-01-05,0.0,0.5\n\
                   2,A,0,2021-01-05,2.0,0.5\n\
                   3,A,-2,2021-01-06,2.0,0.5\n";
        let tx = read_transactions(csv.as_bytes()).unwrap();
        // Zero-priced sale and zero-quantity line dropped, return kept.
        assert_eq!(tx.len(), 1);
        assert!(tx[0].is_return);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let csv = "invoice_id,product_code,quantity,timestamp,unit_price,unit_cost\n";
        assert!(read_transactions(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_validate_headers_reports_each_missing_column() {
        let canonical = vec!["invoice_id".to_string(), "quantity".to_string()];
        let violations = validate_headers(&canonical);
        let columns: Vec<&str> = violations.iter().map(|v| v.column.as_str()).collect();
        assert_eq!(
            columns,
            vec!["product_code", "timestamp", "unit_price", "unit_cost"]
        );
    }
}
