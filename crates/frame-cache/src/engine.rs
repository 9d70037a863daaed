//! Glue between selection, timelines and the frame cache.
//!
//! Every input that can change what is on the map goes through
//! [`AnimationEngine`], which recomposes the overlay descriptors and hands
//! them to the precache manager. The engine itself never awaits: resolve
//! tickets are returned to the caller, resolved elsewhere (see
//! [`resolve_ticket`](crate::resolve_ticket)) and fed back through
//! [`AnimationEngine::apply_resolved`].

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::composer::{compose_overlays, timeline_requests, LayerSelection, ProductCatalog};
use crate::config::AnimationConfig;
use crate::coordinator::{
    ApplyOutcome, CoordinatorState, FrameLabel, ResolveTicket, ResolvedBatch, TimelineCoordinator,
};
use crate::precache::FramePrecacheManager;
use crate::renderer::{LayerHandle, MapRenderer};
use crate::scheduler::{Scheduler, TimerId};

/// Snapshot for UI chrome: play button, scrubber, progress bar, time pills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationStatus {
    pub state: CoordinatorState,
    pub playing: bool,
    pub frame_index: usize,
    pub total_frames: usize,
    /// Fraction of frame layers loaded, 0.0 - 1.0
    pub cache_ratio: f64,
    /// Every active overlay is fully cached
    pub ready: bool,
    pub labels: Vec<FrameLabel>,
}

pub struct AnimationEngine<R: MapRenderer, S: Scheduler + Clone> {
    catalog: ProductCatalog,
    selection: LayerSelection,
    coordinator: TimelineCoordinator<S>,
    precache: FramePrecacheManager<R, S>,
}

impl<R: MapRenderer, S: Scheduler + Clone> AnimationEngine<R, S> {
    pub fn new(config: &AnimationConfig, catalog: ProductCatalog, renderer: R, scheduler: S) -> Self {
        Self {
            catalog,
            selection: LayerSelection::default(),
            coordinator: TimelineCoordinator::new(config, scheduler.clone()),
            precache: FramePrecacheManager::new(config, renderer, scheduler),
        }
    }

    /// Change the active layer set.
    ///
    /// Deactivated overlays are torn down immediately; the returned ticket
    /// (if any) must be resolved and passed to [`Self::apply_resolved`].
    pub fn select(&mut self, selection: LayerSelection) -> Option<ResolveTicket> {
        let requests = timeline_requests(&selection, &self.catalog);
        self.selection = selection;
        let ticket = self.coordinator.set_active(requests);
        self.sync_overlays();
        ticket
    }

    /// Re-resolve the current selection, e.g. on a periodic refresh.
    pub fn refresh(&mut self) -> Option<ResolveTicket> {
        self.coordinator.refresh()
    }

    /// Install resolved timelines; stale batches change nothing.
    pub fn apply_resolved(&mut self, batch: ResolvedBatch) -> ApplyOutcome {
        let outcome = self.coordinator.apply(batch);
        if outcome == ApplyOutcome::Applied {
            self.sync_overlays();
        }
        outcome
    }

    /// Dispatch a fired timer to whichever component owns it.
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if self.coordinator.handle_timer(id) {
            self.sync_overlays();
            return true;
        }
        self.precache.handle_timer(id)
    }

    pub fn on_layer_loaded(&mut self, handle: LayerHandle) -> bool {
        self.precache.on_layer_loaded(handle)
    }

    pub fn play(&mut self) {
        self.coordinator.play();
    }

    pub fn pause(&mut self) {
        self.coordinator.pause();
    }

    pub fn toggle(&mut self) {
        self.coordinator.toggle();
    }

    pub fn seek(&mut self, index: usize) {
        self.coordinator.seek(index);
        self.sync_overlays();
    }

    pub fn step_forward(&mut self) {
        self.coordinator.step_forward();
        self.sync_overlays();
    }

    pub fn step_backward(&mut self) {
        self.coordinator.step_backward();
        self.sync_overlays();
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.coordinator.set_interval(interval);
    }

    /// Show `overlay_id`'s frames without waiting for the rest to load.
    pub fn force_cutover(&mut self, overlay_id: &str) -> bool {
        self.precache.force_cutover(overlay_id)
    }

    pub fn status(&self) -> AnimationStatus {
        let progress = self.precache.progress();
        AnimationStatus {
            state: self.coordinator.state(),
            playing: self.coordinator.is_playing(),
            frame_index: self.coordinator.frame_index(),
            total_frames: self.coordinator.total_frames(),
            cache_ratio: progress.ratio,
            ready: progress.ready,
            labels: self.coordinator.frame_labels(),
        }
    }

    pub fn selection(&self) -> &LayerSelection {
        &self.selection
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn coordinator(&self) -> &TimelineCoordinator<S> {
        &self.coordinator
    }

    pub fn precache(&self) -> &FramePrecacheManager<R, S> {
        &self.precache
    }

    pub fn renderer(&self) -> &R {
        self.precache.renderer()
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        self.precache.renderer_mut()
    }

    /// Stop playback and remove every layer.
    pub fn shutdown(&mut self) {
        self.coordinator.shutdown();
        self.precache.shutdown();
    }

    fn sync_overlays(&mut self) {
        let overlays = compose_overlays(&self.selection, &self.catalog, &self.coordinator);
        debug!(
            overlays = overlays.len(),
            frame_index = self.coordinator.frame_index(),
            "Reconciling overlays"
        );
        self.precache.reconcile(&overlays);
    }
}
