//! Minute-granularity interval arithmetic over `HH:MM` clock strings.

use crate::error::{AppError, AppResult};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parses a zero-padded 24-hour `HH:MM` string into minutes since midnight.
pub fn to_minutes(value: &str) -> AppResult<i64> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(AppError::malformed_time(value));
    }
    if !(bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[3].is_ascii_digit()
        && bytes[4].is_ascii_digit())
    {
        return Err(AppError::malformed_time(value));
    }
    let hours: u32 = value[0..2]
        .parse()
        .map_err(|_| AppError::malformed_time(value))?;
    let minutes: u32 = value[3..5]
        .parse()
        .map_err(|_| AppError::malformed_time(value))?;
    if hours > 23 || minutes > 59 {
        return Err(AppError::malformed_time(value));
    }
    Ok(i64::from(hours) * 60 + i64::from(minutes))
}

/// Inverse of [`to_minutes`]; `total` must be within a single day.
pub fn from_minutes(total: i64) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Half-open overlap: a span ending at 10:00 does not collide with one
/// starting at 10:00.
pub fn overlaps(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// The requested span must fit entirely inside one slot. Spanning two
/// adjacent slots is rejected even when their union would cover it; slots
/// are atomic availability windows.
pub fn contains(slot_start: i64, slot_end: i64, req_start: i64, req_end: i64) -> bool {
    req_start >= slot_start && req_end <= slot_end
}
