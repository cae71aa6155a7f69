//! Mapping between `_lastUpdated` instants and resource surrogate ids.
//!
//! A surrogate id is the last-updated instant, truncated to the millisecond and
//! expressed in 100ns ticks since 0001-01-01, shifted left by three bits. The
//! low bits disambiguate resources written within the same tick range.

use chrono::{DateTime, Utc};

const SHIFT_FACTOR: u32 = 3;
const TICKS_PER_MILLISECOND: i64 = 10_000;
/// Milliseconds between 0001-01-01 and the unix epoch.
const EPOCH_OFFSET_MILLIS: i64 = 62_135_596_800_000;

/// The largest representable surrogate id.
pub const MAX_RESOURCE_SURROGATE_ID: i64 = i64::MAX;

/// Returns the smallest surrogate id a resource updated at `instant` can have.
pub fn last_updated_to_surrogate_id(instant: DateTime<Utc>) -> i64 {
    let millis = instant.timestamp_millis().saturating_add(EPOCH_OFFSET_MILLIS);
    let ticks = millis.saturating_mul(TICKS_PER_MILLISECOND);
    if ticks > (MAX_RESOURCE_SURROGATE_ID >> SHIFT_FACTOR) {
        return MAX_RESOURCE_SURROGATE_ID;
    }
    ticks.max(0) << SHIFT_FACTOR
}
