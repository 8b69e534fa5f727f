use std::collections::BTreeMap;

use portal_client::{AccountId, UsageRecord};
use serde::Serialize;
use time::OffsetDateTime;

pub const UNIT_GALLONS: &str = "gal";

/// Describes one long-term statistic series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticMetadata {
    pub has_mean: bool,
    pub has_sum: bool,
    pub name: String,
    pub source: String,
    pub statistic_id: String,
    pub unit_of_measurement: &'static str,
}

impl StatisticMetadata {
    /// Metadata of the daily usage series for `account`.
    pub fn usage(display_name: &str, account: &AccountId) -> Self {
        let source = integration_domain(display_name);
        Self {
            has_mean: false,
            has_sum: true,
            name: format!("{display_name} Water Usage"),
            statistic_id: format!("{source}:{account}_usage"),
            source,
            unit_of_measurement: UNIT_GALLONS,
        }
    }
}

/// `"DSRSD"` becomes `"dsrsd_water_usage"`.
pub fn integration_domain(display_name: &str) -> String {
    let slug: String = display_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{slug}_water_usage")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticData {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub state: f64,
    /// Running total from the first known reading.
    pub sum: f64,
}

/// Every reading seen so far, one per timestamp.
///
/// Overlapping poll windows re-deliver the same days; the latest value for a
/// timestamp replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct UsageHistory {
    readings: BTreeMap<OffsetDateTime, f64>,
}

impl UsageHistory {
    /// Returns how many timestamps were not known before.
    pub fn merge(&mut self, records: &[UsageRecord]) -> usize {
        records
            .iter()
            .filter(|r| self.readings.insert(r.ts, r.gallons).is_none())
            .count()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn total_gallons(&self) -> f64 {
        self.readings.values().sum()
    }

    /// Readings in ascending time order.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.readings
            .iter()
            .map(|(ts, gallons)| UsageRecord {
                ts: *ts,
                gallons: *gallons,
            })
            .collect()
    }

    /// One row per reading with the running sum recomputed from the start.
    pub fn statistics(&self) -> Vec<StatisticData> {
        let mut sum = 0.0;
        self.readings
            .iter()
            .map(|(start, state)| {
                sum += state;
                StatisticData {
                    start: *start,
                    state: *state,
                    sum,
                }
            })
            .collect()
    }
}
