use chrono_tz::Tz;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::error::{PortalError, PortalResult};
use crate::local_time;

/// Closed time range `[start, end]` requested from the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl UsageWindow {
    /// `[local midnight of (now - days), now]` in the portal's local time,
    /// whole seconds only.
    ///
    /// Daily buckets start at local midnight, so flooring the start keeps the
    /// first bucket inside the window. A start too far back to represent is a
    /// `Config` error.
    pub fn trailing_days(now: OffsetDateTime, days: u32, tz: Tz) -> PortalResult<Self> {
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let start = now
            .checked_sub(Duration::days(i64::from(days)))
            .ok_or_else(|| PortalError::Config(format!("days_back {days} reaches before the supported date range")))?;
        let start = local_time::to_zone(tz, start);
        // Zones whose midnight is skipped by DST keep the unfloored start.
        let start = local_time::assume_local(start.date().midnight(), tz).unwrap_or(start);

        Ok(Self {
            start,
            end: local_time::to_zone(tz, now),
        })
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn start_param(&self) -> PortalResult<String> {
        format_bound(self.start)
    }

    pub fn end_param(&self) -> PortalResult<String> {
        format_bound(self.end)
    }
}

fn format_bound(ts: OffsetDateTime) -> PortalResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| PortalError::Config(format!("cannot format window bound {ts}: {e}")))
}
