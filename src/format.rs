//! Human readable durations and sizes for the console screens.

use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// Formats a number of seconds as `"1hr 2min 3sec"`, dropping the hour part
/// when it is zero.
pub fn human_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours == 0 {
        format!("{}min {}sec", minutes, seconds)
    } else {
        format!("{}hr {}min {}sec", hours, minutes, seconds)
    }
}

pub fn human_elapsed(elapsed: Duration) -> String {
    human_duration(elapsed.as_secs())
}

/// Formats a byte count with one decimal in the largest unit below 1024.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in SIZE_UNITS {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

/// Formats a view count with thousands separators.
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
