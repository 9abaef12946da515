use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Isolates the bits of `value` selected by `mask` and shifts them down so the
/// lowest bit of the mask lands at bit 0.
///
/// `get_sub_value(0x40, 0x60)` is `2`, `get_sub_value(0x04, 0x04)` is `1`.
pub fn get_sub_value(value: u32, mask: u32) -> u32 {
    if mask == 0 {
        return 0;
    }
    (value & mask) >> mask.trailing_zeros()
}

pub fn get_bit(value: u32, bit: u8) -> bool {
    bit < 32 && (value >> bit) & 1 == 1
}

pub fn slice_to_hex_string(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn system_time_to_iso8601(system_time: SystemTime) -> String {
    let datetime: DateTime<Utc> = system_time.into();
    datetime.to_rfc3339()
}

pub fn capture_ts_to_iso8601(timestamp: Duration) -> String {
    match UNIX_EPOCH.checked_add(timestamp) {
        Some(time) => system_time_to_iso8601(time),
        None => "Invalid timestamp".to_string(),
    }
}

/// Formats microseconds as `h:mm:ss.uuuuuu`.
pub fn format_micros(micros: u64) -> String {
    let total_seconds = micros / 1_000_000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}:{:02}.{:06}", hours, minutes, seconds, micros % 1_000_000)
}
