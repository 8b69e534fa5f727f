use time::OffsetDateTime;

/// One daily reading from the portal's time series.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UsageRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub gallons: f64,
}

/// A time-series entry that could not be turned into a `UsageRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position of the entry in the portal response.
    pub index: usize,
    pub reason: String,
}

/// Result of a single `/timeseries` fetch, in portal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSeries {
    pub records: Vec<UsageRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl UsageSeries {
    pub fn total_gallons(&self) -> f64 {
        self.records.iter().map(|r| r.gallons).sum()
    }
}
