//! Map renderer stand-in with random tile latency.
//!
//! Every added layer "loads" after a random delay and reports its handle on
//! a channel, the way a real map fires a one-time load event. Removing a
//! layer drops its pending event.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use frame_cache::{LayerHandle, MapRenderer, TileLayerSpec};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

pub struct SimulatedRenderer {
    next: u64,
    latency_ms: RangeInclusive<u64>,
    loaded: mpsc::UnboundedSender<LayerHandle>,
    pending: HashMap<LayerHandle, AbortHandle>,
    opacities: HashMap<LayerHandle, f32>,
}

impl SimulatedRenderer {
    /// Renderer plus the receiving end of its load events.
    pub fn new(latency_ms: RangeInclusive<u64>) -> (Self, mpsc::UnboundedReceiver<LayerHandle>) {
        let (loaded, rx) = mpsc::unbounded_channel();
        let renderer = Self {
            next: 0,
            latency_ms,
            loaded,
            pending: HashMap::new(),
            opacities: HashMap::new(),
        };
        (renderer, rx)
    }

    /// Layers currently on the map.
    pub fn layer_count(&self) -> usize {
        self.opacities.len()
    }

    /// Layers with non-zero opacity.
    pub fn visible_count(&self) -> usize {
        self.opacities.values().filter(|o| **o > 0.0).count()
    }

    /// A load event was delivered; forget its task.
    pub fn acknowledge(&mut self, handle: LayerHandle) {
        self.pending.remove(&handle);
    }
}

impl MapRenderer for SimulatedRenderer {
    fn add_layer(&mut self, spec: &TileLayerSpec) -> LayerHandle {
        self.next += 1;
        let handle = LayerHandle(self.next);

        let delay = if self.latency_ms.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(self.latency_ms.clone())
        };
        let tx = self.loaded.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            tx.send(handle).ok();
        });

        debug!(layer = %handle, layers = %spec.layers, time = ?spec.time(), delay_ms = delay, "Added layer");
        self.pending.insert(handle, task.abort_handle());
        self.opacities.insert(handle, spec.opacity);
        handle
    }

    fn remove_layer(&mut self, handle: LayerHandle) {
        if let Some(task) = self.pending.remove(&handle) {
            task.abort();
        }
        self.opacities.remove(&handle);
        trace!(layer = %handle, "Removed layer");
    }

    fn set_opacity(&mut self, handle: LayerHandle, opacity: f32) {
        if let Some(current) = self.opacities.get_mut(&handle) {
            *current = opacity;
        }
        trace!(layer = %handle, opacity, "Set opacity");
    }
}

impl Drop for SimulatedRenderer {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> TileLayerSpec {
        TileLayerSpec {
            url: "https://example.com/wms".into(),
            layers: "radar".into(),
            format: "image/png".into(),
            transparent: true,
            params: BTreeMap::new(),
            opacity: 0.0,
            attribution: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_event_after_latency() {
        let (mut renderer, mut rx) = SimulatedRenderer::new(100..=100);
        let handle = renderer.add_layer(&spec());
        assert_eq!(rx.recv().await, Some(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_layer_never_reports() {
        let (mut renderer, mut rx) = SimulatedRenderer::new(100..=100);
        let removed = renderer.add_layer(&spec());
        let kept = renderer.add_layer(&spec());
        renderer.remove_layer(removed);

        assert_eq!(rx.recv().await, Some(kept));
        assert_eq!(renderer.layer_count(), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}
