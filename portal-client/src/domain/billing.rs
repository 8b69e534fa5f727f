use serde_json::Value;

const BILLING_PERIOD: &str = "billing period";

/// Bill totals from the account's `metricAggregates.billAmount` blob.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BillingSnapshot {
    pub projected_total: Option<f64>,
    pub current_total: Option<f64>,
}

impl BillingSnapshot {
    /// Reads `projected` and `current` totals of the billing period.
    ///
    /// The portal reports totals either as JSON numbers or numeric strings.
    pub fn from_bill_amount(bill_amount: &Value) -> Self {
        Self {
            projected_total: period_total(bill_amount, "projected"),
            current_total: period_total(bill_amount, "current"),
        }
    }
}

fn period_total(bill_amount: &Value, key: &str) -> Option<f64> {
    let total = bill_amount.get(key)?.get(BILLING_PERIOD)?.get("total")?;
    match total {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    }
}
