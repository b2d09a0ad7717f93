//! Read-side price transforms shared with the dashboard.

/// Milliseconds per minute of timezone offset
const MS_PER_MINUTE: i64 = 60 * 1000;

/// Percentage move from the day's opening price.
///
/// Returns `None` when the opening price is zero, where the change is undefined.
pub fn percent_change(last_known_price: i64, opening_price: i64) -> Option<f64> {
    if opening_price == 0 {
        return None;
    }
    Some((last_known_price - opening_price) as f64 / opening_price as f64 * 100.0)
}

/// Shift a UTC epoch (ms) so a chart axis shows the viewer's wall-clock time.
///
/// `tz_offset_minutes` follows the browser convention: minutes to add to
/// local time to get UTC, positive west of Greenwich (UTC-5 is `300`).
pub fn utc_to_chart_local(utc_epoch_ms: i64, tz_offset_minutes: i32) -> i64 {
    utc_epoch_ms - i64::from(tz_offset_minutes) * MS_PER_MINUTE
}
