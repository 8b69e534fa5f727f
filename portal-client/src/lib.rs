pub mod domain;
pub mod error;
pub mod local_time;
pub mod portal;

pub use domain::{Account, AccountId, BillingSnapshot, SkippedRecord, UsagePoll, UsageRecord, UsageSeries, UsageWindow};
pub use error::{ErrorKind, PortalError, PortalResult};
pub use portal::{Credentials, PortalConfig, UsagePortalClient};
