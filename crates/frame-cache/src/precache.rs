//! Frame pre-caching and opacity-based frame switching.
//!
//! For every overlay the manager keeps one visible placeholder layer and,
//! in parallel, one hidden layer per frame key. Frame layers are created in
//! small staggered batches. When the last frame of an overlay reports its
//! tiles loaded, the placeholder is removed and the current frame's layer is
//! faded in; from then on changing frames only flips opacities, so stepping,
//! scrubbing and playback cause no network traffic.
//!
//! Every layer handle lives in the registry below; nothing else holds one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnimationConfig;
use crate::frame::{FrameKey, OverlayDescriptor, TileLayerSpec};
use crate::renderer::{LayerHandle, MapRenderer};
use crate::scheduler::{Scheduler, TimerId};

/// Load progress of one overlay. `loaded <= total` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub loaded: usize,
    pub total: usize,
}

impl CacheStatus {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.loaded >= self.total
    }
}

/// Aggregate progress across all active overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheProgress {
    pub loaded: usize,
    pub total: usize,
    /// `loaded / total`, 0 when nothing is expected
    pub ratio: f64,
    /// Every active overlay has all of its (at least one) frames loaded
    pub ready: bool,
}

/// Whether an overlay still shows its placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePhase {
    /// Placeholder visible, frames loading hidden
    Warming,
    /// Placeholder removed, frames switched by opacity
    Live,
}

#[derive(Debug)]
struct FrameSlot {
    handle: LayerHandle,
    loaded: bool,
}

#[derive(Debug)]
struct OverlayCache {
    descriptor: OverlayDescriptor,
    phase: CachePhase,
    placeholder: Option<(LayerHandle, TileLayerSpec)>,
    /// Distinct frame keys in creation order
    order: Vec<FrameKey>,
    frames: HashMap<FrameKey, FrameSlot>,
    next_batch: usize,
    batch_timer: Option<TimerId>,
    /// Frame layer currently at target opacity (Live only)
    active: Option<FrameKey>,
    status: CacheStatus,
}

impl OverlayCache {
    fn new(descriptor: OverlayDescriptor) -> Self {
        Self {
            descriptor,
            phase: CachePhase::Warming,
            placeholder: None,
            order: Vec::new(),
            frames: HashMap::new(),
            next_batch: 0,
            batch_timer: None,
            active: None,
            status: CacheStatus::default(),
        }
    }
}

/// Maintains hidden per-frame tile layers for every active overlay.
pub struct FramePrecacheManager<R: MapRenderer, S: Scheduler> {
    renderer: R,
    scheduler: S,
    batch_size: usize,
    batch_delay: Duration,
    overlays: BTreeMap<String, OverlayCache>,
    /// Frame layer handle -> (overlay, frame key)
    handles: HashMap<LayerHandle, (String, FrameKey)>,
    /// Pending batch timer -> overlay
    batch_timers: HashMap<TimerId, String>,
}

impl<R: MapRenderer, S: Scheduler> FramePrecacheManager<R, S> {
    pub fn new(config: &AnimationConfig, renderer: R, scheduler: S) -> Self {
        Self {
            renderer,
            scheduler,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
            overlays: BTreeMap::new(),
            handles: HashMap::new(),
            batch_timers: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Bring the layer set in line with `descriptors`.
    ///
    /// Only overlays whose inputs changed are touched:
    /// - gone: every layer removed and pending batches cancelled
    /// - new or different source: rebuilt from scratch
    /// - different frame list: frame layers reset, fresh pre-cache cycle
    /// - otherwise: current frame and opacity applied in place
    pub fn reconcile(&mut self, descriptors: &[OverlayDescriptor]) {
        let incoming: HashSet<&str> = descriptors.iter().map(|d| d.id.as_str()).collect();
        let removed: Vec<String> = self
            .overlays
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        for id in removed {
            self.remove_overlay(&id);
        }

        for descriptor in descriptors {
            let change = match self.overlays.get(&descriptor.id) {
                None => Change::New,
                Some(cache) if !cache.descriptor.same_source(descriptor) => Change::Source,
                Some(cache) if cache.descriptor.frames != descriptor.frames => Change::Frames,
                Some(cache) if cache.descriptor != *descriptor => Change::View,
                Some(_) => Change::None,
            };

            match change {
                Change::New => self.start_overlay(descriptor.clone()),
                Change::Source => {
                    self.remove_overlay(&descriptor.id);
                    self.start_overlay(descriptor.clone());
                }
                Change::Frames => self.restart_frames(descriptor.clone()),
                Change::View => self.update_view(descriptor.clone()),
                Change::None => {}
            }
        }
    }

    fn start_overlay(&mut self, descriptor: OverlayDescriptor) {
        let id = descriptor.id.clone();
        info!(overlay = %id, layers = %descriptor.layers, frames = descriptor.frames.len(), "Adding overlay");
        self.overlays.insert(id.clone(), OverlayCache::new(descriptor));
        self.begin_cycle(&id);
    }

    /// New frame list for an existing overlay: drop frame layers, keep the
    /// placeholder if it still matches, restart pre-caching.
    fn restart_frames(&mut self, descriptor: OverlayDescriptor) {
        let id = descriptor.id.clone();
        self.clear_frames(&id);
        if let Some(cache) = self.overlays.get_mut(&id) {
            debug!(
                overlay = %id,
                previous = cache.descriptor.frames.len(),
                frames = descriptor.frames.len(),
                "Frame list changed, restarting pre-cache"
            );
            cache.descriptor = descriptor;
            cache.phase = CachePhase::Warming;
        }
        self.begin_cycle(&id);
    }

    /// Same source and frames: apply opacity and frame selection.
    fn update_view(&mut self, descriptor: OverlayDescriptor) {
        let Some(cache) = self.overlays.get_mut(&descriptor.id) else {
            return;
        };
        let opacity_changed = cache.descriptor.opacity != descriptor.opacity;
        cache.descriptor = descriptor;

        match cache.phase {
            CachePhase::Warming => {
                if let (true, Some((handle, spec))) = (opacity_changed, cache.placeholder.as_mut()) {
                    spec.opacity = cache.descriptor.opacity;
                    self.renderer.set_opacity(*handle, spec.opacity);
                }
            }
            CachePhase::Live => {
                let target = cache.descriptor.current_frame.clone();
                Self::show_frame(&mut self.renderer, cache, target.as_ref(), opacity_changed);
            }
        }
    }

    /// Ensure the placeholder and start creating frame layers.
    fn begin_cycle(&mut self, id: &str) {
        let Some(cache) = self.overlays.get_mut(id) else {
            return;
        };

        let spec = cache.descriptor.placeholder_spec();
        let keep = match (&cache.placeholder, &spec) {
            (Some((_, existing)), Some(spec)) => existing == spec,
            (None, None) => true,
            _ => false,
        };
        if !keep {
            if let Some((handle, _)) = cache.placeholder.take() {
                self.renderer.remove_layer(handle);
            }
            if let Some(spec) = spec {
                let handle = self.renderer.add_layer(&spec);
                debug!(overlay = %id, layer = %handle, "Placeholder added");
                cache.placeholder = Some((handle, spec));
            }
        }

        let mut seen = HashSet::new();
        cache.order = cache
            .descriptor
            .frames
            .iter()
            .filter(|k| seen.insert(*k))
            .cloned()
            .collect();
        cache.next_batch = 0;
        cache.active = None;
        cache.phase = CachePhase::Warming;
        cache.status = CacheStatus {
            loaded: 0,
            total: cache.order.len(),
        };

        self.create_next_batch(id, self.batch_size);
    }

    /// Create up to `limit` hidden frame layers, scheduling the rest.
    fn create_next_batch(&mut self, id: &str, limit: usize) {
        let Some(cache) = self.overlays.get_mut(id) else {
            return;
        };

        let start = cache.next_batch;
        let end = start.saturating_add(limit).min(cache.order.len());
        for key in &cache.order[start..end] {
            let handle = self.renderer.add_layer(&cache.descriptor.frame_spec(key));
            cache.frames.insert(key.clone(), FrameSlot { handle, loaded: false });
            self.handles.insert(handle, (id.to_string(), key.clone()));
        }
        cache.next_batch = end;

        if end < cache.order.len() {
            let timer = self.scheduler.schedule_once(self.batch_delay);
            self.batch_timers.insert(timer, id.to_string());
            cache.batch_timer = Some(timer);
        } else {
            cache.batch_timer = None;
        }

        debug!(overlay = %id, created = end - start, remaining = cache.order.len() - end, "Created frame batch");
    }

    /// Cancel pending batches and remove every frame layer of `id`.
    fn clear_frames(&mut self, id: &str) {
        let Some(cache) = self.overlays.get_mut(id) else {
            return;
        };

        if let Some(timer) = cache.batch_timer.take() {
            self.scheduler.cancel(timer);
            self.batch_timers.remove(&timer);
        }
        for (_, slot) in cache.frames.drain() {
            self.renderer.remove_layer(slot.handle);
            self.handles.remove(&slot.handle);
        }
        cache.active = None;
        cache.next_batch = 0;
        cache.status = CacheStatus {
            loaded: 0,
            total: cache.status.total,
        };
    }

    fn remove_overlay(&mut self, id: &str) {
        self.clear_frames(id);
        if let Some(mut cache) = self.overlays.remove(id) {
            if let Some((handle, _)) = cache.placeholder.take() {
                self.renderer.remove_layer(handle);
            }
            info!(overlay = %id, "Removed overlay");
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Handle a fired timer. Returns `true` if it was a batch timer.
    pub fn handle_timer(&mut self, timer: TimerId) -> bool {
        let Some(id) = self.batch_timers.remove(&timer) else {
            return false;
        };
        let current = self.overlays.get(&id).and_then(|c| c.batch_timer);
        if current == Some(timer) {
            if let Some(cache) = self.overlays.get_mut(&id) {
                cache.batch_timer = None;
            }
            self.create_next_batch(&id, self.batch_size);
        }
        true
    }

    /// A layer finished loading its visible tiles.
    ///
    /// Events for unknown handles (removed layers, placeholders) and repeated
    /// events are ignored. Returns `true` if the event counted.
    pub fn on_layer_loaded(&mut self, handle: LayerHandle) -> bool {
        let Some((id, key)) = self.handles.get(&handle).cloned() else {
            debug!(layer = %handle, "Ignoring load event for untracked layer");
            return false;
        };
        let Some(cache) = self.overlays.get_mut(&id) else {
            return false;
        };
        let Some(slot) = cache.frames.get_mut(&key) else {
            return false;
        };
        if slot.loaded {
            return false;
        }

        slot.loaded = true;
        cache.status.loaded = (cache.status.loaded + 1).min(cache.status.total);
        debug!(
            overlay = %id,
            frame = %key,
            loaded = cache.status.loaded,
            total = cache.status.total,
            "Frame loaded"
        );

        if cache.phase == CachePhase::Warming && cache.status.is_complete() {
            Self::cut_over(&mut self.renderer, &id, cache);
        }
        true
    }

    /// Remove the placeholder and reveal the current frame, even if some
    /// frames never reported loaded.
    ///
    /// Frame layers still waiting on a batch timer are created first. Returns
    /// `false` if already live or if there is no current frame to reveal.
    pub fn force_cutover(&mut self, id: &str) -> bool {
        if self.phase(id) != Some(CachePhase::Warming) {
            return false;
        }
        self.flush_batches(id);

        let Some(cache) = self.overlays.get_mut(id) else {
            return false;
        };
        let revealable = cache
            .descriptor
            .current_frame
            .as_ref()
            .is_some_and(|key| cache.frames.contains_key(key));
        if !revealable {
            warn!(overlay = %id, "No current frame to reveal, keeping placeholder");
            return false;
        }

        warn!(
            overlay = %id,
            loaded = cache.status.loaded,
            total = cache.status.total,
            "Forcing cutover with partially cached frames"
        );
        Self::cut_over(&mut self.renderer, id, cache);
        true
    }

    /// Create every remaining frame layer of `id` now.
    fn flush_batches(&mut self, id: &str) {
        let Some(cache) = self.overlays.get_mut(id) else {
            return;
        };
        if let Some(timer) = cache.batch_timer.take() {
            self.scheduler.cancel(timer);
            self.batch_timers.remove(&timer);
        }
        if cache.next_batch < cache.order.len() {
            self.create_next_batch(id, usize::MAX);
        }
    }

    fn cut_over(renderer: &mut R, id: &str, cache: &mut OverlayCache) {
        if let Some((handle, _)) = cache.placeholder.take() {
            renderer.remove_layer(handle);
        }
        cache.phase = CachePhase::Live;
        let target = cache.descriptor.current_frame.clone();
        Self::show_frame(renderer, cache, target.as_ref(), false);
        info!(
            overlay = %id,
            frames = cache.status.total,
            active = ?cache.active.as_ref().map(FrameKey::as_str),
            "Pre-cache complete, switched to cached frames"
        );
    }

    /// Make `target` the only frame at target opacity.
    ///
    /// A key without a layer leaves the current frame in place.
    fn show_frame(renderer: &mut R, cache: &mut OverlayCache, target: Option<&FrameKey>, force: bool) {
        let Some(target) = target else {
            return;
        };
        let Some(next) = cache.frames.get(target).map(|s| s.handle) else {
            warn!(overlay = %cache.descriptor.id, frame = %target, "No cached layer for frame, keeping current");
            return;
        };

        if cache.active.as_ref() == Some(target) {
            if force {
                renderer.set_opacity(next, cache.descriptor.opacity);
            }
            return;
        }

        if let Some(previous) = cache.active.as_ref().and_then(|k| cache.frames.get(k)) {
            renderer.set_opacity(previous.handle, 0.0);
        }
        renderer.set_opacity(next, cache.descriptor.opacity);
        cache.active = Some(target.clone());
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    pub fn cache_status(&self, id: &str) -> Option<CacheStatus> {
        self.overlays.get(id).map(|c| c.status)
    }

    pub fn phase(&self, id: &str) -> Option<CachePhase> {
        self.overlays.get(id).map(|c| c.phase)
    }

    /// Frame key currently shown by a live overlay.
    pub fn active_frame(&self, id: &str) -> Option<&FrameKey> {
        self.overlays.get(id).and_then(|c| c.active.as_ref())
    }

    /// Handle of the hidden layer for `key`, if created.
    pub fn frame_handle(&self, id: &str, key: &FrameKey) -> Option<LayerHandle> {
        self.overlays
            .get(id)
            .and_then(|c| c.frames.get(key))
            .map(|s| s.handle)
    }

    pub fn placeholder_handle(&self, id: &str) -> Option<LayerHandle> {
        self.overlays
            .get(id)
            .and_then(|c| c.placeholder.as_ref())
            .map(|(handle, _)| *handle)
    }

    pub fn overlay_ids(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    /// Aggregate progress across all active overlays.
    pub fn progress(&self) -> CacheProgress {
        let (loaded, total) = self
            .overlays
            .values()
            .fold((0, 0), |(l, t), c| (l + c.status.loaded, t + c.status.total));
        let ratio = if total == 0 {
            0.0
        } else {
            (loaded as f64 / total as f64).min(1.0)
        };
        let ready = !self.overlays.is_empty() && self.overlays.values().all(|c| c.status.is_complete());
        CacheProgress {
            loaded,
            total,
            ratio,
            ready,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Remove every layer and cancel every pending batch.
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.overlays.keys().cloned().collect();
        for id in ids {
            self.remove_overlay(&id);
        }
    }
}

impl<R: MapRenderer, S: Scheduler> Drop for FramePrecacheManager<R, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    New,
    Source,
    Frames,
    View,
    None,
}
