use super::{AccountId, BillingSnapshot, UsageRecord, UsageWindow};

/// Everything collected during one login/logout cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePoll {
    pub account_id: AccountId,
    pub window: UsageWindow,
    /// Portal order; empty when the time-series fetch failed.
    pub records: Vec<UsageRecord>,
    /// Number of time-series entries that could not be parsed.
    pub skipped: usize,
    pub billing: Option<BillingSnapshot>,
}
