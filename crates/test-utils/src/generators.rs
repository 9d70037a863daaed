//! Frame key generators for creating synthetic timelines.
//!
//! These generators create predictable, verifiable timestamp series in the
//! normalized `YYYY-MM-DDTHH:MM:SSZ` form the resolver produces.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Fixed reference instant used by the generators: 2026-02-18T14:00:00Z.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 18, 14, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Creates `count` timestamps starting at [`reference_time`], `step_minutes` apart.
///
/// # Example
///
/// ```
/// use test_utils::minute_series;
///
/// let keys = minute_series(3, 10);
/// assert_eq!(keys, vec![
///     "2026-02-18T14:00:00Z",
///     "2026-02-18T14:10:00Z",
///     "2026-02-18T14:20:00Z",
/// ]);
/// ```
pub fn minute_series(count: usize, step_minutes: i64) -> Vec<String> {
    let start = reference_time();
    (0..count as i64)
        .map(|i| start + Duration::minutes(i * step_minutes))
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .collect()
}

/// Creates forecast layer names like `gfs_TMP_f000`, `gfs_TMP_f003`, ...
///
/// # Example
///
/// ```
/// use test_utils::forecast_layers;
///
/// assert_eq!(forecast_layers("gfs_TMP", &[0, 3]), vec!["gfs_TMP_f000", "gfs_TMP_f003"]);
/// ```
pub fn forecast_layers(prefix: &str, hours: &[u32]) -> Vec<String> {
    hours
        .iter()
        .map(|h| format!("{}_f{:03}", prefix, h))
        .collect()
}

/// Build an interval dimension string covering `count` steps of `step_minutes`.
pub fn interval_dimension(count: usize, step_minutes: i64) -> String {
    let series = minute_series(count.max(1), step_minutes);
    format!(
        "{}/{}/PT{}M",
        series[0],
        series[series.len() - 1],
        step_minutes
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_series_spacing() {
        let keys = minute_series(4, 6);
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[3], "2026-02-18T14:18:00Z");
    }

    #[test]
    fn test_interval_dimension() {
        assert_eq!(
            interval_dimension(3, 30),
            "2026-02-18T14:00:00Z/2026-02-18T15:00:00Z/PT30M"
        );
    }
}
