//! Common fakes for frame-cache integration tests
//!
//! Provides:
//! - A recording map renderer that hands out handles and logs every call
//! - Overlay descriptor and catalog builders
//! - Helpers for draining batch timers and completing loads

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use frame_cache::{
    FrameKey, FrameMode, FramePrecacheManager, LayerHandle, MapRenderer, OverlayDescriptor, ProductCatalog,
    TileLayerSpec, VirtualScheduler,
};

/// One call made against the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Add(LayerHandle),
    Remove(LayerHandle),
    Opacity(LayerHandle, f32),
}

/// A layer currently on the map.
#[derive(Debug, Clone)]
pub struct LiveLayer {
    pub spec: TileLayerSpec,
    pub opacity: f32,
}

/// Map renderer fake: never reuses handles, records every call.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    next: u64,
    pub live: BTreeMap<LayerHandle, LiveLayer>,
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn adds(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, RenderCall::Add(_))).count()
    }

    pub fn removes_of(&self, handle: LayerHandle) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == RenderCall::Remove(handle))
            .count()
    }

    /// Live layers with a non-zero opacity.
    pub fn visible(&self) -> Vec<(LayerHandle, &LiveLayer)> {
        self.live
            .iter()
            .filter(|(_, l)| l.opacity > 0.0)
            .map(|(h, l)| (*h, l))
            .collect()
    }

    pub fn opacity(&self, handle: LayerHandle) -> Option<f32> {
        self.live.get(&handle).map(|l| l.opacity)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl MapRenderer for RecordingRenderer {
    fn add_layer(&mut self, spec: &TileLayerSpec) -> LayerHandle {
        self.next += 1;
        let handle = LayerHandle(self.next);
        self.live.insert(
            handle,
            LiveLayer {
                spec: spec.clone(),
                opacity: spec.opacity,
            },
        );
        self.calls.push(RenderCall::Add(handle));
        handle
    }

    fn remove_layer(&mut self, handle: LayerHandle) {
        self.live.remove(&handle);
        self.calls.push(RenderCall::Remove(handle));
    }

    fn set_opacity(&mut self, handle: LayerHandle, opacity: f32) {
        if let Some(layer) = self.live.get_mut(&handle) {
            layer.opacity = opacity;
        }
        self.calls.push(RenderCall::Opacity(handle, opacity));
    }
}

pub type TestManager = FramePrecacheManager<RecordingRenderer, VirtualScheduler>;

/// Time-mode descriptor over `keys`, showing the last one.
pub fn time_overlay(id: &str, keys: &[String]) -> OverlayDescriptor {
    OverlayDescriptor {
        id: id.to_string(),
        url: format!("https://{}.example.com/wms", id),
        layers: format!("{}_layer", id),
        opacity: 0.7,
        format: "image/png".to_string(),
        transparent: true,
        current_frame: keys.last().map(|k| FrameKey::new(k.as_str())),
        frames: keys.iter().map(|k| FrameKey::new(k.as_str())).collect(),
        mode: FrameMode::Time,
        extra_params: BTreeMap::new(),
        attribution: "NOAA".to_string(),
    }
}

/// Forecast-mode descriptor over per-hour layer names, showing the first.
pub fn forecast_overlay(id: &str, layers: &[String]) -> OverlayDescriptor {
    OverlayDescriptor {
        current_frame: layers.first().map(|k| FrameKey::new(k.as_str())),
        mode: FrameMode::Forecast,
        ..time_overlay(id, layers)
    }
}

/// Run every pending batch timer until the schedule is empty.
pub fn drain_batches(scheduler: &VirtualScheduler, manager: &mut TestManager) {
    scheduler.advance(Duration::from_secs(60), |id| {
        manager.handle_timer(id);
    });
}

/// Fire a load event for every frame layer of `overlay`, in `keys` order.
pub fn load_frames(manager: &mut TestManager, overlay: &str, keys: &[String]) {
    for key in keys {
        if let Some(handle) = manager.frame_handle(overlay, &FrameKey::new(key.as_str())) {
            manager.on_layer_loaded(handle);
        }
    }
}

/// Catalog with one radar, one satellite and one forecast product.
pub fn catalog() -> ProductCatalog {
    ProductCatalog::from_yaml_str(
        r#"
products:
  - id: mrms
    kind: radar
    title: MRMS Base Reflectivity
    url: https://radar.example.com/wms
    layer: radar_base_reflectivity
    attribution: NOAA/NSSL
  - id: goes_ir
    kind: satellite
    title: GOES-18 Clean IR
    url: https://sat.example.com/wms
    layer: goes18_CMI_C13
    opacity: 0.6
  - id: gfs
    kind: forecast
    title: GFS
    url: https://model.example.com/wms
    layer: gfs_{param}
    parameters:
      TMP: { ELEVATION: "2 m above ground" }
    forecast:
      layer_template: gfs_{param}_f{hour}
      hours: [0, 3, 6, 9]
"#,
    )
    .expect("fixture catalog is valid")
}
