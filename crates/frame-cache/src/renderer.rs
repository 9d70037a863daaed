//! Map-rendering collaborator seam.
//!
//! The renderer owns tile requests, decoding and projection. This crate only
//! adds, removes and fades whole layers, and is told when a layer's visible
//! tiles have finished loading.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::TileLayerSpec;

/// Renderer-issued identifier of one tile layer.
///
/// Handles must never be reused by a renderer instance, so a load event for
/// a removed layer can be recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerHandle(pub u64);

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Operations the precache manager needs from the map.
///
/// Load completion is delivered out of band: whoever owns the event source
/// calls [`FramePrecacheManager::on_layer_loaded`](crate::FramePrecacheManager::on_layer_loaded)
/// once per handle.
pub trait MapRenderer {
    /// Add a tile layer and start fetching its visible tiles.
    fn add_layer(&mut self, spec: &TileLayerSpec) -> LayerHandle;

    /// Remove a layer and drop its pending load listener.
    fn remove_layer(&mut self, handle: LayerHandle);

    /// Set a layer's opacity without any transition.
    fn set_opacity(&mut self, handle: LayerHandle, opacity: f32);
}
