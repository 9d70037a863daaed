//! TIME dimension values: timestamp normalization and interval expansion.
//!
//! A WMS TIME dimension is a comma-separated list of segments. Each segment
//! is either an explicit timestamp or an ISO 8601 interval `start/end/step`:
//!
//! - Single time: `2024-01-15T12:00:00Z`
//! - Interval: `2024-01-15T00:00:00Z/2024-01-16T00:00:00Z/PT1H`
//! - Mixed: `2024-01-15T00:00:00Z,2024-01-15T06:00:00Z/2024-01-15T12:00:00Z/PT3H`
//!
//! Segments are classified independently and the expanded values are
//! concatenated and deduplicated in first-seen order.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::duration::step_millis;
use crate::error::{DimensionError, DimensionResult};

/// Upper bound on timestamps produced by a single interval segment.
///
/// Longer intervals keep only the most recent steps.
pub const MAX_INTERVAL_STEPS: i64 = 10_000;

/// Canonical output format: second precision, `Z` suffix.
const NORMALIZED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Resolved time axis of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDimension {
    /// Ordered, deduplicated timestamps as advertised by the server
    pub values: Vec<String>,
    /// Server-advertised default timestamp, if any
    pub default: Option<String>,
}

impl TimeDimension {
    pub fn new(values: Vec<String>, default: Option<String>) -> Self {
        Self { values, default }
    }

    /// Build from the raw textual content of a dimension element.
    pub fn from_dimension_text(text: &str, default: Option<&str>) -> Self {
        let default = default
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| normalize_timestamp(d).unwrap_or_else(|| d.to_string()));
        Self {
            values: expand_dimension(text),
            default,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The most recent advertised timestamp.
    pub fn latest(&self) -> Option<&str> {
        self.values
            .iter()
            .filter_map(|v| parse_timestamp(v).map(|dt| (dt, v)))
            .max_by_key(|(dt, _)| *dt)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    // Full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Without timezone, optional fractional seconds
    let naive = s.strip_suffix('Z').unwrap_or(s);
    if let Ok(ndt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    // Minute precision
    if let Ok(ndt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    // Date only
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    None
}

/// Format a timestamp in the canonical `YYYY-MM-DDTHH:MM:SSZ` form.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(NORMALIZED_FORMAT).to_string()
}

/// Normalize a timestamp to the `…Z` form, dropping sub-second precision.
pub fn normalize_timestamp(s: &str) -> Option<String> {
    parse_timestamp(s).map(|dt| format_timestamp(&dt))
}

/// Expand a `start/end/step` interval, inclusive of both endpoints.
///
/// Fails with [`DimensionError::MalformedInterval`] when either endpoint is
/// not a valid date, the end precedes the start, or the step is not a
/// positive duration.
pub fn expand_interval(start: &str, end: &str, step: &str) -> DimensionResult<Vec<String>> {
    let malformed = || DimensionError::MalformedInterval(format!("{}/{}/{}", start, end, step));

    let start_dt = parse_timestamp(start).ok_or_else(malformed)?;
    let end_dt = parse_timestamp(end).ok_or_else(malformed)?;
    let step_ms = step_millis(step);

    if step_ms <= 0 || end_dt < start_dt {
        return Err(malformed());
    }

    let span_ms = (end_dt - start_dt).num_milliseconds();
    let steps = span_ms / step_ms + 1;
    let skip = (steps - MAX_INTERVAL_STEPS).max(0);

    let values = (skip..steps)
        .map(|i| start_dt + chrono::Duration::milliseconds(i * step_ms))
        .map(|dt| format_timestamp(&dt))
        .collect();

    Ok(values)
}

/// Expand a full dimension string into an ordered, deduplicated list.
///
/// Never fails: a malformed interval contributes its (normalized if
/// possible) start token, and an unparseable literal is kept verbatim.
pub fn expand_dimension(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for segment in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let expanded = if segment.contains('/') {
            expand_segment_interval(segment)
        } else {
            vec![normalize_timestamp(segment).unwrap_or_else(|| segment.to_string())]
        };

        for value in expanded {
            if seen.insert(value.clone()) {
                out.push(value);
            }
        }
    }

    out
}

fn expand_segment_interval(segment: &str) -> Vec<String> {
    let parts: Vec<&str> = segment.split('/').map(str::trim).collect();
    let start = parts[0];

    let result = match parts.as_slice() {
        [start, end, step] => expand_interval(start, end, step),
        _ => Err(DimensionError::MalformedInterval(segment.to_string())),
    };

    match result {
        Ok(values) => values,
        Err(e) => {
            warn!(segment = %segment, error = %e, "Falling back to single interval start");
            vec![normalize_timestamp(start).unwrap_or_else(|| start.to_string())]
        }
    }
}
