//! Monthly cohort retention: the one stateful computation in the engine.
//!
//! Months are walked strictly in chronological order over the observed
//! month list (months with at least one transaction anywhere); "previous
//! month" means the previous observed month. Churn is attributed to the
//! detection month: a customer active in month m-1 and absent in month m
//! counts toward `churned` of month m. The first observed month therefore
//! reports zero retained, reactivated and churned.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::aggregate::MonthlyMetricRow;
use crate::metrics::period_from_year_month;

/// Per-month activity-state counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionCohortRow {
    pub period: NaiveDate,
    pub year_month: String,
    pub active_customers: u64,
    /// Active, and this is the customer's first-ever active month.
    pub new_customers: u64,
    /// Active now and in the previous observed month.
    pub retained: u64,
    /// Active now, inactive last month, active in some earlier month.
    pub reactivated: u64,
    /// Active last month, inactive now.
    pub churned: u64,
}

/// Classify customer activity month by month from the customer-by-month
/// series. A customer-month row counts as active even if it only contains
/// returns.
pub fn monthly_retention(
    customer_monthly: &[MonthlyMetricRow],
) -> crate::Result<Vec<RetentionCohortRow>> {
    let months: BTreeSet<&str> = customer_monthly
        .iter()
        .filter(|row| row.dimension.is_some())
        .map(|row| row.year_month.as_str())
        .collect();
    let months: Vec<&str> = months.into_iter().collect();
    let month_index: HashMap<&str, usize> =
        months.iter().enumerate().map(|(i, &m)| (m, i)).collect();

    let mut activity: HashMap<&str, BTreeSet<usize>> = HashMap::new();
    for row in customer_monthly {
        if let Some(customer) = &row.dimension {
            activity
                .entry(customer.as_str())
                .or_default()
                .insert(month_index[row.year_month.as_str()]);
        }
    }

    let mut out = Vec::with_capacity(months.len());
    for (i, month) in months.iter().enumerate() {
        let mut active_customers = 0u64;
        let mut new_customers = 0u64;
        let mut retained = 0u64;
        let mut reactivated = 0u64;
        let mut churned = 0u64;

        for active_months in activity.values() {
            let active_now = active_months.contains(&i);
            if active_now {
                active_customers += 1;
                let first = *active_months.iter().next().expect("non-empty set");
                if first == i {
                    new_customers += 1;
                } else if i > 0 && active_months.contains(&(i - 1)) {
                    retained += 1;
                } else {
                    // Not first month and not active last month, so there
                    // must be activity strictly before i-1.
                    reactivated += 1;
                }
            } else if i > 0 && active_months.contains(&(i - 1)) {
                churned += 1;
            }
        }

        out.push(RetentionCohortRow {
            period: period_from_year_month(month)?,
            year_month: (*month).to_string(),
            active_customers,
            new_customers,
            retained,
            reactivated,
            churned,
        });
    }
    Ok(out)
}
