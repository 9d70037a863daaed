//! Timelines and cross-timeline frame mapping.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time_dimension::{parse_timestamp, TimeDimension};

use crate::frame::{FrameKey, FrameMode};

/// Ordered frame keys of one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub overlay_id: String,
    pub mode: FrameMode,
    keys: Vec<FrameKey>,
}

impl Timeline {
    /// Timeline with no frames; animation is disabled for the overlay.
    pub fn empty(overlay_id: impl Into<String>, mode: FrameMode) -> Self {
        Self {
            overlay_id: overlay_id.into(),
            mode,
            keys: Vec::new(),
        }
    }

    /// Time-mode timeline from a resolved dimension.
    ///
    /// Timestamps are ordered oldest first and only the most recent
    /// `max_frames` are kept.
    pub fn from_dimension(overlay_id: impl Into<String>, dimension: &TimeDimension, max_frames: usize) -> Self {
        let mut values: Vec<&String> = dimension.values.iter().collect();
        values.sort_by_key(|v| parse_timestamp(v));

        let skip = values.len().saturating_sub(max_frames);
        Self {
            overlay_id: overlay_id.into(),
            mode: FrameMode::Time,
            keys: values
                .into_iter()
                .skip(skip)
                .map(|v| FrameKey::new(v.as_str()))
                .collect(),
        }
    }

    /// Forecast-mode timeline whose keys are alternate layer names.
    ///
    /// Order is preserved (analysis first) and the first `max_frames`
    /// distinct keys are kept.
    pub fn forecast<I, K>(overlay_id: impl Into<String>, keys: I, max_frames: usize) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FrameKey>,
    {
        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &FrameKey| seen.insert(k.clone()))
            .take(max_frames)
            .collect();
        Self {
            overlay_id: overlay_id.into(),
            mode: FrameMode::Forecast,
            keys,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[FrameKey] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<&FrameKey> {
        self.keys.get(index)
    }

    /// Index shown when this timeline becomes primary.
    ///
    /// Forecasts start at the analysis frame, observations at the latest.
    pub fn initial_index(&self) -> usize {
        match self.mode {
            FrameMode::Forecast => 0,
            FrameMode::Time => self.keys.len().saturating_sub(1),
        }
    }
}

/// Human-readable label for a frame key.
pub fn frame_label(mode: FrameMode, key: &FrameKey) -> String {
    match (mode, parse_timestamp(key.as_str())) {
        (FrameMode::Time, Some(dt)) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        _ => key.as_str().to_string(),
    }
}

/// Map the primary frame index onto a secondary timeline by relative position.
///
/// `progress = primary_index / (primary_total - 1)` (1.0 when the primary has
/// at most one frame), then `round(progress * (secondary_len - 1))`.
/// Returns `None` when the secondary timeline is empty.
pub fn map_frame_index(primary_index: usize, primary_total: usize, secondary_len: usize) -> Option<usize> {
    if secondary_len == 0 {
        return None;
    }

    let progress = if primary_total <= 1 {
        1.0
    } else {
        (primary_index.min(primary_total - 1) as f64) / ((primary_total - 1) as f64)
    };

    let mapped = (progress * (secondary_len - 1) as f64).round() as usize;
    Some(mapped.min(secondary_len - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_endpoints_and_midpoint() {
        assert_eq!(map_frame_index(9, 10, 4), Some(3));
        assert_eq!(map_frame_index(0, 10, 4), Some(0));
        assert_eq!(map_frame_index(4, 10, 4), Some(1));
    }

    #[test]
    fn test_mapping_degenerate_primary() {
        assert_eq!(map_frame_index(0, 1, 5), Some(4));
        assert_eq!(map_frame_index(0, 0, 5), Some(4));
        assert_eq!(map_frame_index(3, 10, 0), None);
    }

    #[test]
    fn test_mapping_identity_for_equal_lengths() {
        for i in 0..6 {
            assert_eq!(map_frame_index(i, 6, 6), Some(i));
        }
    }

    #[test]
    fn test_from_dimension_sorts_and_keeps_most_recent() {
        let dim = TimeDimension::new(
            vec![
                "2026-01-01T03:00:00Z".into(),
                "2026-01-01T01:00:00Z".into(),
                "2026-01-01T02:00:00Z".into(),
                "2026-01-01T00:00:00Z".into(),
            ],
            None,
        );
        let timeline = Timeline::from_dimension("radar", &dim, 3);
        let keys: Vec<&str> = timeline.keys().iter().map(FrameKey::as_str).collect();
        assert_eq!(
            keys,
            vec!["2026-01-01T01:00:00Z", "2026-01-01T02:00:00Z", "2026-01-01T03:00:00Z"]
        );
        assert_eq!(timeline.initial_index(), 2);
    }

    #[test]
    fn test_forecast_keeps_order_and_head() {
        let timeline = Timeline::forecast("model", ["f000", "f003", "f003", "f006", "f009"], 3);
        let keys: Vec<&str> = timeline.keys().iter().map(FrameKey::as_str).collect();
        assert_eq!(keys, vec!["f000", "f003", "f006"]);
        assert_eq!(timeline.initial_index(), 0);
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            frame_label(FrameMode::Time, &"2026-02-18T14:06:00Z".into()),
            "2026-02-18 14:06 UTC"
        );
        assert_eq!(frame_label(FrameMode::Forecast, &"gfs_TMP_f003".into()), "gfs_TMP_f003");
    }
}
