use crate::pipeline::{Envelope, PipelineError, Transform};
use portal_client::{UsagePoll, UsageRecord};
use time::macros::datetime;

/// Why a single reading is not fit for the statistics history.
///
/// Rules:
/// - gallons must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn reject_reason(record: &UsageRecord) -> Option<&'static str> {
    if !record.gallons.is_finite() {
        return Some("gallons must be finite");
    }
    if record.gallons < 0.0 {
        return Some("gallons must be non-negative");
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);
    if record.ts < min_ts || record.ts >= max_ts {
        return Some("timestamp out of allowed range");
    }

    None
}

/// Drops invalid readings from a poll; the poll itself always passes.
pub fn validate_usage_poll(mut env: Envelope<UsagePoll>) -> Envelope<UsagePoll> {
    let poll = &mut env.payload;
    let before = poll.records.len();

    poll.records.retain(|record| match reject_reason(record) {
        Some(reason) => {
            tracing::warn!(ts = %record.ts, gallons = record.gallons, reason, "dropping usage reading");
            false
        }
        None => true,
    });

    let rejected = before - poll.records.len();
    poll.skipped += rejected;
    if rejected > 0 {
        metrics::counter!("validation_usage_rejected_total").increment(rejected as u64);
    }
    env
}

#[derive(Clone, Default)]
pub struct UsagePollValidation;

#[async_trait::async_trait]
impl Transform<UsagePoll, UsagePoll> for UsagePollValidation {
    async fn apply(&self, input: Envelope<UsagePoll>) -> Result<Envelope<UsagePoll>, PipelineError> {
        Ok(validate_usage_poll(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_client::{AccountId, UsageWindow};

    fn poll(records: Vec<UsageRecord>) -> UsagePoll {
        UsagePoll {
            account_id: AccountId::parse("1").unwrap(),
            window: UsageWindow {
                start: datetime!(2024-01-01 00:00 -8),
                end: datetime!(2024-01-08 00:00 -8),
            },
            records,
            skipped: 1,
            billing: None,
        }
    }

    #[test]
    fn valid_reading_passes() {
        let r = UsageRecord { ts: datetime!(2024-01-02 00:00 -8), gallons: 0.0 };
        assert_eq!(reject_reason(&r), None);
    }

    #[test]
    fn bad_readings_have_reasons() {
        let ts = datetime!(2024-01-02 00:00 -8);
        assert!(reject_reason(&UsageRecord { ts, gallons: -1.0 }).is_some());
        assert!(reject_reason(&UsageRecord { ts, gallons: f64::NAN }).is_some());
        assert!(reject_reason(&UsageRecord { ts, gallons: f64::INFINITY }).is_some());
        assert!(reject_reason(&UsageRecord { ts: datetime!(1999-12-31 00:00 UTC), gallons: 1.0 }).is_some());
        assert!(reject_reason(&UsageRecord { ts: datetime!(2100-01-01 00:00 UTC), gallons: 1.0 }).is_some());
    }

    #[tokio::test]
    async fn transform_drops_only_bad_readings_and_counts_them() {
        let input = Envelope::new(poll(vec![
            UsageRecord { ts: datetime!(2024-01-02 00:00 -8), gallons: 12.0 },
            UsageRecord { ts: datetime!(2024-01-03 00:00 -8), gallons: -4.0 },
            UsageRecord { ts: datetime!(2024-01-04 00:00 -8), gallons: 8.0 },
        ]));

        let out = UsagePollValidation.apply(input).await.unwrap().payload;

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1].gallons, 8.0);
        assert_eq!(out.skipped, 2);
    }
}
