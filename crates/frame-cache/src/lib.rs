//! Flicker-free animation of time-series map tiles.
//!
//! Pieces, leaf first:
//! - [`Timeline`] and [`map_frame_index`]: ordered frame keys per overlay and
//!   the proportional mapping between timelines of different lengths
//! - [`TimelineCoordinator`]: the single shared frame index and playback clock
//! - [`FramePrecacheManager`]: hidden per-frame tile layers, batched creation
//!   and opacity-only frame switching
//! - [`compose_overlays`]: selection + current frames to overlay descriptors
//! - [`AnimationEngine`]: the glue a UI drives
//!
//! Time is injected through [`Scheduler`] and the map through [`MapRenderer`],
//! so the whole pipeline runs deterministically under [`VirtualScheduler`].

pub mod composer;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod frame;
pub mod precache;
pub mod renderer;
pub mod scheduler;
pub mod timeline;

pub use composer::{
    compose_overlays, timeline_requests, ForecastSteps, LayerSelection, LayerToggle, Product, ProductCatalog,
    ProductKind, FORECAST_OVERLAY, RADAR_OVERLAY, SATELLITE_OVERLAY,
};
pub use config::AnimationConfig;
pub use coordinator::{
    resolve_ticket, ApplyOutcome, CoordinatorState, FrameLabel, FrameLookup, ResolveTicket, ResolvedBatch,
    ResolvedFrames, TimelineCoordinator, TimelineOutcome, TimelineRequest, TimelineSource,
};
pub use engine::{AnimationEngine, AnimationStatus};
pub use frame::{FrameKey, FrameMode, OverlayDescriptor, TileLayerSpec};
pub use precache::{CachePhase, CacheProgress, CacheStatus, FramePrecacheManager};
pub use renderer::{LayerHandle, MapRenderer};
pub use scheduler::{Scheduler, TimerId, TokioScheduler, VirtualScheduler};
pub use timeline::{frame_label, map_frame_index, Timeline};
