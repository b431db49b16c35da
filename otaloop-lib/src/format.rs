//! Human readable transfer figures for progress lines.

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Format a transfer rate: `512 B/s`, `2.0 KB/s`, `5.00 MB/s`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second < KIB {
        format!("{} B/s", bytes_per_second as u64)
    } else if bytes_per_second < MIB {
        format!("{:.1} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.2} MB/s", bytes_per_second / MIB)
    }
}

/// Format a duration in seconds as `MM:SS`, rounded to the nearest second.
///
/// Negative input is treated as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_eta(seconds: f64) -> String {
    let total = (seconds.max(0.0) + 0.5) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Render a `[====    ]` bar, `width` columns between the brackets.
#[must_use]
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("[{}{}]", "=".repeat(filled), " ".repeat(width - filled))
}
