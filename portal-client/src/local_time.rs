//! Bridges IANA zone rules (`chrono-tz`) onto `time` offsets.

use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// UTC offset in effect in `tz` at the instant `at`.
pub fn offset_at(tz: Tz, at: OffsetDateTime) -> UtcOffset {
    let seconds = chrono::DateTime::from_timestamp(at.unix_timestamp(), 0)
        .map(|utc| tz.offset_from_utc_datetime(&utc.naive_utc()).fix().local_minus_utc())
        .unwrap_or(0);
    UtcOffset::from_whole_seconds(seconds).unwrap_or(UtcOffset::UTC)
}

/// Expresses `at` in the local time of `tz`.
pub fn to_zone(tz: Tz, at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(offset_at(tz, at))
}

/// Interprets a wall-clock time as local time in `tz`.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times
/// skipped by a DST jump have no meaning and yield `None`.
pub fn assume_local(naive: PrimitiveDateTime, tz: Tz) -> Option<OffsetDateTime> {
    let local = NaiveDate::from_ymd_opt(naive.year(), u8::from(naive.month()).into(), naive.day().into())?
        .and_hms_opt(naive.hour().into(), naive.minute().into(), naive.second().into())?;
    let seconds = tz.from_local_datetime(&local).earliest()?.offset().fix().local_minus_utc();
    let offset = UtcOffset::from_whole_seconds(seconds).ok()?;
    Some(naive.assume_offset(offset))
}
