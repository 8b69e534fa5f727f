//! Mapping of the portal's loosely-typed JSON into domain types.

use chrono_tz::Tz;
use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime,
};
use tracing::{debug, warn};

use crate::domain::{Account, AccountId, BillingSnapshot, SkippedRecord, UsageRecord, UsageSeries};
use crate::error::{PortalError, PortalResult};
use crate::local_time;

const ACCOUNTS: &str = "accounts";
const TIMESERIES: &str = "timeseries";

fn account_entries(body: &Value) -> PortalResult<&Vec<Value>> {
    match body.get("accounts") {
        Some(Value::Array(entries)) => Ok(entries),
        Some(other) => Err(PortalError::Parse {
            endpoint: ACCOUNTS,
            reason: format!("expected an accounts array, got {}", json_type(other)),
        }),
        None => Err(PortalError::DataUnavailable {
            endpoint: ACCOUNTS,
            reason: "response has no accounts field".to_string(),
        }),
    }
}

/// Candidate meters in portal order. Entries without a usable `_id` are dropped.
pub fn parse_accounts(body: &Value) -> PortalResult<Vec<Account>> {
    let entries = account_entries(body)?;

    let accounts = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let id = entry.get("_id").and_then(id_string).and_then(|s| AccountId::parse(&s));
            match id {
                Some(id) => Some(Account {
                    id,
                    is_ami: entry.get("IsAMI").is_some_and(truthy),
                }),
                None => {
                    debug!(index, "ignoring account entry without _id");
                    None
                }
            }
        })
        .collect();

    Ok(accounts)
}

/// Bill totals for `preferred`, or for the first account carrying aggregates.
pub fn parse_billing(body: &Value, preferred: Option<&AccountId>) -> PortalResult<BillingSnapshot> {
    let entries = account_entries(body)?;

    let has_aggregates = |entry: &&Value| entry.get("metricAggregates").is_some_and(|v| !v.is_null());
    let is_preferred = |entry: &&Value| {
        preferred.is_some_and(|want| {
            entry
                .get("_id")
                .and_then(id_string)
                .is_some_and(|id| id.trim() == want.as_str())
        })
    };

    let entry = entries
        .iter()
        .filter(has_aggregates)
        .find(is_preferred)
        .or_else(|| entries.iter().find(has_aggregates))
        .ok_or_else(|| PortalError::DataUnavailable {
            endpoint: ACCOUNTS,
            reason: "no account carries metricAggregates".to_string(),
        })?;

    let bill_amount = entry
        .get("metricAggregates")
        .and_then(|aggregates| aggregates.get("billAmount"))
        .filter(|v| !v.is_null())
        .ok_or_else(|| PortalError::DataUnavailable {
            endpoint: ACCOUNTS,
            reason: "metricAggregates has no billAmount".to_string(),
        })?;

    Ok(BillingSnapshot::from_bill_amount(bill_amount))
}

/// Daily readings in portal order.
///
/// Entries missing `startTime` or `waterUseActual.gallons` are reported in
/// `skipped` instead of failing the whole series. Timestamps without an offset
/// are taken as local time in `tz`.
pub fn parse_timeseries(body: &Value, tz: Tz) -> PortalResult<UsageSeries> {
    let entries = match body.get("timeseries") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(PortalError::Parse {
                endpoint: TIMESERIES,
                reason: format!("expected a timeseries array, got {}", json_type(other)),
            })
        }
        None => {
            return Err(PortalError::DataUnavailable {
                endpoint: TIMESERIES,
                reason: "response has no timeseries field".to_string(),
            })
        }
    };

    let mut series = UsageSeries::default();
    for (index, entry) in entries.iter().enumerate() {
        match parse_usage_entry(entry, tz) {
            Ok(record) => series.records.push(record),
            Err(reason) => {
                warn!(index, %reason, "skipping timeseries entry");
                series.skipped.push(SkippedRecord { index, reason });
            }
        }
    }

    Ok(series)
}

fn parse_usage_entry(entry: &Value, tz: Tz) -> Result<UsageRecord, String> {
    let start = entry
        .get("startTime")
        .and_then(Value::as_str)
        .ok_or("missing startTime")?;
    let ts = parse_timestamp(start, tz).ok_or_else(|| format!("invalid startTime '{start}'"))?;

    let gallons = entry
        .get("waterUseActual")
        .and_then(|usage| usage.get("gallons"))
        .and_then(Value::as_f64)
        .ok_or("missing waterUseActual.gallons")?;

    Ok(UsageRecord { ts, gallons })
}

fn parse_timestamp(raw: &str, tz: Tz) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    let naive = PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).ok()?;
    local_time::assume_local(naive, tz)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "y"),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn accounts_keep_order_and_read_ami_flag() {
        let body = json!({
            "accounts": [
                { "_id": "100", "IsAMI": false },
                { "IsAMI": true },
                { "_id": 200, "IsAMI": "TRUE" },
                { "_id": "  " }
            ]
        });

        let accounts = parse_accounts(&body).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id.as_str(), "100");
        assert!(!accounts[0].is_ami);
        assert_eq!(accounts[1].id.as_str(), "200");
        assert!(accounts[1].is_ami);
    }

    #[test]
    fn accounts_missing_or_mistyped() {
        assert!(matches!(
            parse_accounts(&json!({})),
            Err(PortalError::DataUnavailable { .. })
        ));
        assert!(matches!(
            parse_accounts(&json!({ "accounts": "nope" })),
            Err(PortalError::Parse { .. })
        ));
        assert!(parse_accounts(&json!({ "accounts": [] })).unwrap().is_empty());
    }

    #[test]
    fn billing_prefers_resolved_account() {
        let body = json!({
            "accounts": [
                { "_id": "1", "metricAggregates": { "billAmount": {
                    "current": { "billing period": { "total": 10.0 } }
                }}},
                { "_id": "2", "metricAggregates": { "billAmount": {
                    "current": { "billing period": { "total": 20.0 } }
                }}}
            ]
        });

        let preferred = AccountId::parse("2").unwrap();
        let snapshot = parse_billing(&body, Some(&preferred)).unwrap();
        assert_eq!(snapshot.current_total, Some(20.0));

        let snapshot = parse_billing(&body, None).unwrap();
        assert_eq!(snapshot.current_total, Some(10.0));
    }

    #[test]
    fn billing_absent_is_data_unavailable() {
        let body = json!({ "accounts": [ { "_id": "1" }, { "_id": "2", "metricAggregates": {} } ] });
        assert!(matches!(
            parse_billing(&body, None),
            Err(PortalError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn timeseries_skips_incomplete_entries() {
        let body = json!({
            "timeseries": [
                { "startTime": "2024-01-01T00:00:00-08:00", "waterUseActual": { "gallons": 120.5 } },
                { "startTime": "2024-01-02T00:00:00-08:00", "waterUseActual": {} },
                { "startTime": "2024-01-03T00:00:00-08:00", "waterUseActual": { "gallons": 98 } },
                { "waterUseActual": { "gallons": 1.0 } }
            ]
        });

        let series = parse_timeseries(&body, Los_Angeles).unwrap();
        assert_eq!(series.records.len(), 2);
        assert_eq!(series.records[0].gallons, 120.5);
        assert_eq!(series.records[1].gallons, 98.0);
        assert_eq!(series.records[1].ts, datetime!(2024-01-03 00:00 -8));
        assert_eq!(series.skipped.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn timeseries_without_offset_uses_portal_zone() {
        let body = json!({
            "timeseries": [
                { "startTime": "2024-07-04T00:00:00", "waterUseActual": { "gallons": 5.0 } }
            ]
        });

        let series = parse_timeseries(&body, Los_Angeles).unwrap();
        assert_eq!(series.records[0].ts, datetime!(2024-07-04 07:00 UTC));
    }

    #[test]
    fn timeseries_missing_key_is_data_unavailable() {
        assert!(matches!(
            parse_timeseries(&json!({ "other": [] }), Los_Angeles),
            Err(PortalError::DataUnavailable { .. })
        ));
        assert!(parse_timeseries(&json!({ "timeseries": [] }), Los_Angeles)
            .unwrap()
            .records
            .is_empty());
    }
}
