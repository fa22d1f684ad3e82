//! Time helpers shared by the coordinator, metrics and events.

use std::time::Duration;

/// Whole milliseconds in a duration, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Mean of a duration total over `count` samples, in fractional milliseconds.
///
/// Returns `0.0` when there are no samples.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total.as_secs_f64() * 1000.0 / count as f64
}
