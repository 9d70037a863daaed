//! Frame keys, overlay descriptors and the tile layer specs derived from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque value distinguishing one animation frame from another.
///
/// In time-mode it is a normalized timestamp used as the TIME parameter;
/// in forecast-mode it is the name of the layer holding that frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameKey(String);

impl FrameKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FrameKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How an overlay interprets its frame keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Same layer, frame key sent as the TIME parameter
    #[default]
    Time,
    /// Frame key replaces the layer name, no TIME parameter
    Forecast,
}

/// Everything the precache manager needs to render one overlay.
///
/// `layers` stays stable across frame changes; per-frame identity lives
/// only in `current_frame` and `frames`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    pub id: String,
    /// Tile endpoint
    pub url: String,
    /// Base layer name
    pub layers: String,
    /// Target opacity of the visible frame (0.0 - 1.0)
    pub opacity: f32,
    /// Image MIME type, e.g. `image/png`
    pub format: String,
    pub transparent: bool,
    /// Frame currently selected by the timeline
    pub current_frame: Option<FrameKey>,
    /// Full ordered frame list for pre-caching
    pub frames: Vec<FrameKey>,
    pub mode: FrameMode,
    /// Static query parameters sent with every tile request
    pub extra_params: BTreeMap<String, String>,
    pub attribution: String,
}

impl OverlayDescriptor {
    /// Whether both descriptors request tiles from the same source.
    ///
    /// Differences in frame selection or opacity do not count; anything else
    /// requires rebuilding the overlay's layers from scratch.
    pub fn same_source(&self, other: &OverlayDescriptor) -> bool {
        self.url == other.url
            && self.layers == other.layers
            && self.format == other.format
            && self.transparent == other.transparent
            && self.mode == other.mode
            && self.extra_params == other.extra_params
            && self.attribution == other.attribution
    }

    /// Always-visible placeholder shown while frames are still loading.
    ///
    /// Forecast layer names only exist per frame, so a forecast overlay has
    /// no placeholder until its frames are known.
    pub fn placeholder_spec(&self) -> Option<TileLayerSpec> {
        let layers = match (self.mode, self.frames.first()) {
            (FrameMode::Time, _) => self.layers.clone(),
            (FrameMode::Forecast, Some(first)) => first.as_str().to_string(),
            (FrameMode::Forecast, None) => return None,
        };
        Some(self.spec_with(layers, None, self.opacity))
    }

    /// Hidden per-frame layer for `key`.
    pub fn frame_spec(&self, key: &FrameKey) -> TileLayerSpec {
        match self.mode {
            FrameMode::Time => self.spec_with(self.layers.clone(), Some(key), 0.0),
            FrameMode::Forecast => self.spec_with(key.as_str().to_string(), None, 0.0),
        }
    }

    fn spec_with(&self, layers: String, time: Option<&FrameKey>, opacity: f32) -> TileLayerSpec {
        let mut params = self.extra_params.clone();
        if let Some(time) = time {
            params.insert("TIME".to_string(), time.as_str().to_string());
        }
        TileLayerSpec {
            url: self.url.clone(),
            layers,
            format: self.format.clone(),
            transparent: self.transparent,
            params,
            opacity,
            attribution: self.attribution.clone(),
        }
    }
}

/// Request for one tile layer handed to the map renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLayerSpec {
    pub url: String,
    pub layers: String,
    pub format: String,
    pub transparent: bool,
    /// Extra query parameters, including TIME in time-mode
    pub params: BTreeMap<String, String>,
    pub opacity: f32,
    pub attribution: String,
}

impl TileLayerSpec {
    /// TIME parameter carried by this layer, if any.
    pub fn time(&self) -> Option<&str> {
        self.params.get("TIME").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(mode: FrameMode) -> OverlayDescriptor {
        OverlayDescriptor {
            id: "radar".into(),
            url: "https://example.com/wms".into(),
            layers: "base".into(),
            opacity: 0.7,
            format: "image/png".into(),
            transparent: true,
            current_frame: Some("k1".into()),
            frames: vec!["k0".into(), "k1".into()],
            mode,
            extra_params: BTreeMap::from([("ELEVATION".to_string(), "850".to_string())]),
            attribution: "NOAA".into(),
        }
    }

    #[test]
    fn test_time_mode_frame_spec_carries_time() {
        let d = descriptor(FrameMode::Time);
        let spec = d.frame_spec(&"k1".into());
        assert_eq!(spec.layers, "base");
        assert_eq!(spec.time(), Some("k1"));
        assert_eq!(spec.params.get("ELEVATION").map(String::as_str), Some("850"));
        assert_eq!(spec.opacity, 0.0);
    }

    #[test]
    fn test_forecast_mode_frame_spec_swaps_layer() {
        let d = descriptor(FrameMode::Forecast);
        let spec = d.frame_spec(&"k1".into());
        assert_eq!(spec.layers, "k1");
        assert_eq!(spec.time(), None);
    }

    #[test]
    fn test_placeholder_has_no_time() {
        let time = descriptor(FrameMode::Time).placeholder_spec().unwrap();
        assert_eq!(time.layers, "base");
        assert_eq!(time.time(), None);
        assert_eq!(time.opacity, 0.7);

        let forecast = descriptor(FrameMode::Forecast).placeholder_spec().unwrap();
        assert_eq!(forecast.layers, "k0");
    }

    #[test]
    fn test_unresolved_forecast_has_no_placeholder() {
        let mut forecast = descriptor(FrameMode::Forecast);
        forecast.frames.clear();
        forecast.current_frame = None;
        assert_eq!(forecast.placeholder_spec(), None);

        let mut time = descriptor(FrameMode::Time);
        time.frames.clear();
        assert_eq!(time.placeholder_spec().map(|s| s.layers), Some("base".to_string()));
    }

    #[test]
    fn test_same_source_ignores_frame_selection() {
        let a = descriptor(FrameMode::Time);
        let mut b = a.clone();
        b.current_frame = Some("k0".into());
        b.opacity = 0.3;
        b.frames.push("k2".into());
        assert!(a.same_source(&b));

        b.extra_params.insert("ELEVATION".into(), "500".into());
        assert!(!a.same_source(&b));
    }
}
