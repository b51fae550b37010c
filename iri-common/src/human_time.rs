//! Human-readable elapsed time for progress lines
//!
//! Series runs take tens of seconds per timestep, so progress output needs
//! durations from a few seconds up to many hours.

use std::time::Duration;

/// Format selection thresholds (seconds)
const SHORT_FORMAT_MAX: u64 = 100; // < 100s → X.Xs
const MEDIUM_FORMAT_MAX: u64 = 6000; // < 100m → M:SS
                                     // >= 100m → H:MM:SS

/// Format a duration for display.
///
/// - Short format (`X.Xs`): under 100 seconds
/// - Medium format (`M:SS`): 100 seconds to 100 minutes
/// - Long format (`H:MM:SS`): 100 minutes and beyond
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use iri_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_millis(4500)), "4.5s");
/// assert_eq!(format_elapsed(Duration::from_secs(330)), "5:30");
/// assert_eq!(format_elapsed(Duration::from_secs(7261)), "2:01:01");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();

    if secs < SHORT_FORMAT_MAX {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else if secs < MEDIUM_FORMAT_MAX {
        format!("{}:{:02}", secs / 60, secs % 60)
    } else {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Estimate remaining time from the mean duration of completed steps.
///
/// Returns `None` until at least one step has completed.
pub fn estimate_remaining(completed: usize, total: usize, elapsed: Duration) -> Option<Duration> {
    if completed == 0 || completed > total {
        return None;
    }
    let per_step = elapsed.as_secs_f64() / completed as f64;
    Some(Duration::from_secs_f64(per_step * (total - completed) as f64))
}

/// One-line progress summary: `[  3/10]  30.0% elapsed 1:05 eta 2:32`
pub fn progress_line(index: usize, total: usize, elapsed: Duration) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        index as f64 * 100.0 / total as f64
    };
    let width = total.to_string().len();
    let eta = estimate_remaining(index, total, elapsed)
        .map(format_elapsed)
        .unwrap_or_else(|| "--".to_string());

    format!(
        "[{:>width$}/{}] {:5.1}% elapsed {} eta {}",
        index,
        total,
        percent,
        format_elapsed(elapsed),
        eta,
        width = width
    )
}
