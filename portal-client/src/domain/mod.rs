pub mod account;
pub mod billing;
pub mod poll;
pub mod usage_record;
pub mod window;

pub use account::{select_account, Account, AccountId};
pub use billing::BillingSnapshot;
pub use poll::UsagePoll;
pub use usage_record::{SkippedRecord, UsageRecord, UsageSeries};
pub use window::UsageWindow;
