//! Timeline coordinator: the shared animation clock.
//!
//! Owns one timeline per active overlay, designates the primary, and exposes
//! a single frame index with playback controls. Secondary timelines follow
//! the primary by relative position (see [`map_frame_index`]).
//!
//! Resolution is split in three steps so the coordinator is never borrowed
//! across a network await:
//!
//! 1. [`TimelineCoordinator::set_active`] / [`TimelineCoordinator::refresh`]
//!    issue a [`ResolveTicket`] carrying a fresh sequence number.
//! 2. [`resolve_ticket`] resolves the ticket's requests concurrently.
//! 3. [`TimelineCoordinator::apply`] installs the result only if its sequence
//!    number is still the latest; anything older is discarded.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use time_dimension::{
    CapabilitiesSource, DimensionError, DimensionResult, TimeDimension, TimeDimensionResolver,
};
use tracing::{debug, info, warn};

use crate::config::AnimationConfig;
use crate::frame::{FrameKey, FrameMode};
use crate::scheduler::{Scheduler, TimerId};
use crate::timeline::{frame_label, map_frame_index, Timeline};

/// Lifecycle of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// No active overlays, or none with any frames
    Empty,
    /// A resolve request is in flight
    Loading,
    /// Timelines populated, controls enabled
    Ready,
}

/// Where an overlay's frame keys come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineSource {
    /// TIME dimension advertised by a capabilities endpoint
    Capabilities { layer: String, url: String },
    /// Fixed list of per-step layer names
    Forecast { keys: Vec<String> },
}

/// One overlay's timeline to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineRequest {
    pub overlay_id: String,
    pub source: TimelineSource,
}

/// A resolve request stamped with its sequence number.
#[derive(Debug, Clone)]
pub struct ResolveTicket {
    pub seq: u64,
    pub requests: Vec<TimelineRequest>,
}

/// Frame keys produced for one request.
#[derive(Debug, Clone)]
pub enum ResolvedFrames {
    Times(TimeDimension),
    Forecast(Vec<String>),
}

#[derive(Debug)]
pub struct TimelineOutcome {
    pub request: TimelineRequest,
    pub result: DimensionResult<ResolvedFrames>,
}

/// Results for every request of one ticket.
#[derive(Debug)]
pub struct ResolvedBatch {
    pub seq: u64,
    pub outcomes: Vec<TimelineOutcome>,
}

/// Whether [`TimelineCoordinator::apply`] installed a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Stale,
}

/// Label of the frame currently shown by one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLabel {
    pub overlay_id: String,
    pub frame_key: FrameKey,
    pub label: String,
}

/// Read access to the current frame selection, consumed by the composer.
pub trait FrameLookup {
    /// Frame currently shown for `overlay_id`.
    fn current_key(&self, overlay_id: &str) -> Option<&FrameKey>;

    /// Full ordered frame list for `overlay_id`.
    fn keys(&self, overlay_id: &str) -> &[FrameKey];
}

/// Resolve every request of `ticket` concurrently.
///
/// Failures stay local to their request; the batch always completes.
pub async fn resolve_ticket<S: CapabilitiesSource>(
    ticket: ResolveTicket,
    resolver: &TimeDimensionResolver<S>,
) -> ResolvedBatch {
    let seq = ticket.seq;
    let outcomes = join_all(ticket.requests.into_iter().map(|request| async move {
        let result = match &request.source {
            TimelineSource::Capabilities { layer, url } => {
                resolver.resolve(layer, url).await.map(ResolvedFrames::Times)
            }
            TimelineSource::Forecast { keys } => Ok(ResolvedFrames::Forecast(keys.clone())),
        };
        TimelineOutcome { request, result }
    }))
    .await;

    ResolvedBatch { seq, outcomes }
}

fn find_request<'a>(requests: &'a [TimelineRequest], overlay_id: &str) -> Option<&'a TimelineRequest> {
    requests.iter().find(|r| r.overlay_id == overlay_id)
}

/// Owns the timelines, the shared frame index and the playback clock.
pub struct TimelineCoordinator<S: Scheduler> {
    scheduler: S,
    max_frames: usize,
    interval: Duration,
    state: CoordinatorState,
    requests: Vec<TimelineRequest>,
    /// In request order
    timelines: Vec<Timeline>,
    primary: Option<usize>,
    frame_index: usize,
    playing: bool,
    latest_seq: u64,
    playback_timer: Option<TimerId>,
    /// (total frames, interval) the running timer was created for
    timer_params: Option<(usize, Duration)>,
}

impl<S: Scheduler> TimelineCoordinator<S> {
    pub fn new(config: &AnimationConfig, scheduler: S) -> Self {
        Self {
            scheduler,
            max_frames: config.max_frames.max(1),
            interval: config.playback_interval(),
            state: CoordinatorState::Empty,
            requests: Vec::new(),
            timelines: Vec::new(),
            primary: None,
            frame_index: 0,
            playing: false,
            latest_seq: 0,
            playback_timer: None,
            timer_params: None,
        }
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Replace the active overlay set.
    ///
    /// Timelines of overlays whose request is unchanged are kept until the
    /// new batch arrives. Returns `None` when the set is empty; any in-flight
    /// request is invalidated either way.
    pub fn set_active(&mut self, requests: Vec<TimelineRequest>) -> Option<ResolveTicket> {
        let previous = std::mem::take(&mut self.requests);
        self.timelines.retain(|t| {
            match (find_request(&previous, &t.overlay_id), find_request(&requests, &t.overlay_id)) {
                (Some(old), Some(new)) => old == new,
                _ => false,
            }
        });
        self.requests = requests;
        self.select_primary();

        if self.requests.is_empty() {
            self.latest_seq += 1;
            self.state = CoordinatorState::Empty;
            self.frame_index = 0;
            self.sync_playback_timer();
            info!("No active overlays");
            return None;
        }

        Some(self.issue_ticket())
    }

    /// Re-issue the resolve step for the current overlay set.
    ///
    /// Playback state is left alone apart from entering `Loading`.
    pub fn refresh(&mut self) -> Option<ResolveTicket> {
        if self.requests.is_empty() {
            return None;
        }
        Some(self.issue_ticket())
    }

    fn issue_ticket(&mut self) -> ResolveTicket {
        self.latest_seq += 1;
        self.state = CoordinatorState::Loading;
        debug!(seq = self.latest_seq, overlays = self.requests.len(), "Issued resolve request");
        ResolveTicket {
            seq: self.latest_seq,
            requests: self.requests.clone(),
        }
    }

    fn ensure_fresh(&self, seq: u64) -> DimensionResult<()> {
        if seq == self.latest_seq {
            Ok(())
        } else {
            Err(DimensionError::StaleResult {
                issued: seq,
                latest: self.latest_seq,
            })
        }
    }

    /// Install a resolved batch if it answers the latest request.
    pub fn apply(&mut self, batch: ResolvedBatch) -> ApplyOutcome {
        if let Err(e) = self.ensure_fresh(batch.seq) {
            debug!(error = %e, "Discarding resolve result");
            return ApplyOutcome::Stale;
        }

        self.timelines = batch
            .outcomes
            .into_iter()
            .map(|outcome| self.build_timeline(outcome))
            .collect();
        self.select_primary();

        let total = self.total_frames();
        self.frame_index = self
            .primary_timeline()
            .map_or(0, Timeline::initial_index);
        self.state = if total > 0 {
            CoordinatorState::Ready
        } else {
            CoordinatorState::Empty
        };
        self.sync_playback_timer();

        info!(
            seq = batch.seq,
            timelines = self.timelines.len(),
            primary = ?self.primary_timeline().map(|t| t.overlay_id.as_str()),
            total_frames = total,
            frame_index = self.frame_index,
            "Timelines ready"
        );
        ApplyOutcome::Applied
    }

    fn build_timeline(&self, outcome: TimelineOutcome) -> Timeline {
        let TimelineOutcome { request, result } = outcome;
        let mode = match request.source {
            TimelineSource::Capabilities { .. } => FrameMode::Time,
            TimelineSource::Forecast { .. } => FrameMode::Forecast,
        };

        match result {
            Ok(ResolvedFrames::Times(dimension)) => {
                Timeline::from_dimension(request.overlay_id, &dimension, self.max_frames)
            }
            Ok(ResolvedFrames::Forecast(keys)) => {
                Timeline::forecast(request.overlay_id, keys, self.max_frames)
            }
            Err(e) if e.is_transient() => match self.timeline(&request.overlay_id) {
                Some(previous) if !previous.is_empty() && previous.mode == mode => {
                    warn!(
                        overlay = %request.overlay_id,
                        error = %e,
                        code = e.code(),
                        frames = previous.len(),
                        "Refresh failed, keeping previous timeline"
                    );
                    previous.clone()
                }
                _ => Self::unavailable(request.overlay_id, mode, &e),
            },
            Err(e) => Self::unavailable(request.overlay_id, mode, &e),
        }
    }

    fn unavailable(overlay_id: String, mode: FrameMode, e: &DimensionError) -> Timeline {
        warn!(
            overlay = %overlay_id,
            error = %e,
            code = e.code(),
            "Timeline unavailable, animation disabled for overlay"
        );
        Timeline::empty(overlay_id, mode)
    }

    /// First timeline in request order that has frames.
    fn select_primary(&mut self) {
        self.primary = self.timelines.iter().position(|t| !t.is_empty());
        let total = self.total_frames();
        if total == 0 {
            self.frame_index = 0;
        } else if self.frame_index >= total {
            self.frame_index = total - 1;
        }
    }

    // ------------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------------

    pub fn play(&mut self) {
        self.playing = true;
        self.sync_playback_timer();
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.sync_playback_timer();
    }

    pub fn toggle(&mut self) {
        self.playing = !self.playing;
        self.sync_playback_timer();
    }

    /// Jump to `index`, clamped to the available frames.
    pub fn seek(&mut self, index: usize) {
        let total = self.total_frames();
        if total == 0 {
            return;
        }
        self.frame_index = index.min(total - 1);
    }

    /// Next frame, wrapping to the first.
    pub fn step_forward(&mut self) {
        let total = self.total_frames();
        if total == 0 {
            return;
        }
        self.frame_index = (self.frame_index + 1) % total;
    }

    /// Previous frame, wrapping to the last.
    pub fn step_backward(&mut self) {
        let total = self.total_frames();
        if total == 0 {
            return;
        }
        self.frame_index = (self.frame_index + total - 1) % total;
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval.max(Duration::from_millis(1));
        self.sync_playback_timer();
    }

    /// Handle a fired timer. Returns `true` if it was the playback clock.
    pub fn handle_timer(&mut self, id: TimerId) -> bool {
        if self.playback_timer != Some(id) {
            return false;
        }
        self.step_forward();
        true
    }

    /// Cancel the playback clock and stop playing.
    pub fn shutdown(&mut self) {
        self.playing = false;
        self.sync_playback_timer();
    }

    /// Keep exactly one playback timer matching the current parameters.
    fn sync_playback_timer(&mut self) {
        let total = self.total_frames();
        let wanted = (self.playing && total > 0).then_some((total, self.interval));
        if wanted == self.timer_params && (wanted.is_some() == self.playback_timer.is_some()) {
            return;
        }

        if let Some(id) = self.playback_timer.take() {
            self.scheduler.cancel(id);
        }
        self.timer_params = wanted;
        if let Some((_, interval)) = wanted {
            let id = self.scheduler.schedule_repeating(interval);
            debug!(timer = %id, interval_ms = interval.as_millis() as u64, total_frames = total, "Playback clock started");
            self.playback_timer = Some(id);
        }
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn total_frames(&self) -> usize {
        self.primary_timeline().map_or(0, Timeline::len)
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn playback_timer(&self) -> Option<TimerId> {
        self.playback_timer
    }

    pub fn primary_timeline(&self) -> Option<&Timeline> {
        self.primary.and_then(|i| self.timelines.get(i))
    }

    pub fn timeline(&self, overlay_id: &str) -> Option<&Timeline> {
        self.timelines.iter().find(|t| t.overlay_id == overlay_id)
    }

    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    /// Index shown by `overlay_id`, mapped from the primary index.
    pub fn current_index(&self, overlay_id: &str) -> Option<usize> {
        let position = self.timelines.iter().position(|t| t.overlay_id == overlay_id)?;
        if Some(position) == self.primary {
            return Some(self.frame_index);
        }
        map_frame_index(self.frame_index, self.total_frames(), self.timelines[position].len())
    }

    /// Human-readable time of the current frame, per overlay with frames.
    pub fn frame_labels(&self) -> Vec<FrameLabel> {
        self.timelines
            .iter()
            .filter_map(|t| {
                let key = self.current_key(&t.overlay_id)?;
                Some(FrameLabel {
                    overlay_id: t.overlay_id.clone(),
                    frame_key: key.clone(),
                    label: frame_label(t.mode, key),
                })
            })
            .collect()
    }
}

impl<S: Scheduler> FrameLookup for TimelineCoordinator<S> {
    fn current_key(&self, overlay_id: &str) -> Option<&FrameKey> {
        let index = self.current_index(overlay_id)?;
        self.timeline(overlay_id)?.key(index)
    }

    fn keys(&self, overlay_id: &str) -> &[FrameKey] {
        self.timeline(overlay_id).map(Timeline::keys).unwrap_or(&[])
    }
}

impl<S: Scheduler> Drop for TimelineCoordinator<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualScheduler;

    fn forecast_request(id: &str, keys: &[&str]) -> TimelineRequest {
        TimelineRequest {
            overlay_id: id.to_string(),
            source: TimelineSource::Forecast {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        }
    }

    fn applied(coordinator: &mut TimelineCoordinator<VirtualScheduler>, ticket: ResolveTicket) {
        let outcomes = ticket
            .requests
            .into_iter()
            .map(|request| {
                let keys = match &request.source {
                    TimelineSource::Forecast { keys } => keys.clone(),
                    TimelineSource::Capabilities { .. } => Vec::new(),
                };
                TimelineOutcome {
                    request,
                    result: Ok(ResolvedFrames::Forecast(keys)),
                }
            })
            .collect();
        let outcome = coordinator.apply(ResolvedBatch { seq: ticket.seq, outcomes });
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[test]
    fn test_empty_set_returns_no_ticket() {
        let mut coordinator = TimelineCoordinator::new(&AnimationConfig::default(), VirtualScheduler::new());
        assert!(coordinator.set_active(Vec::new()).is_none());
        assert_eq!(coordinator.state(), CoordinatorState::Empty);
        assert!(coordinator.refresh().is_none());
    }

    #[test]
    fn test_forecast_primary_starts_at_zero() {
        let mut coordinator = TimelineCoordinator::new(&AnimationConfig::default(), VirtualScheduler::new());
        let ticket = coordinator
            .set_active(vec![forecast_request("model", &["f0", "f3", "f6"])])
            .unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Loading);

        applied(&mut coordinator, ticket);
        assert_eq!(coordinator.state(), CoordinatorState::Ready);
        assert_eq!(coordinator.frame_index(), 0);
        assert_eq!(coordinator.total_frames(), 3);
    }

    #[test]
    fn test_seek_clamps_and_steps_wrap() {
        let mut coordinator = TimelineCoordinator::new(&AnimationConfig::default(), VirtualScheduler::new());
        let ticket = coordinator
            .set_active(vec![forecast_request("model", &["a", "b", "c", "d"])])
            .unwrap();
        applied(&mut coordinator, ticket);

        coordinator.seek(99);
        assert_eq!(coordinator.frame_index(), 3);
        coordinator.step_forward();
        assert_eq!(coordinator.frame_index(), 0);
        coordinator.step_backward();
        assert_eq!(coordinator.frame_index(), 3);
    }

    #[test]
    fn test_controls_noop_without_frames() {
        let mut coordinator = TimelineCoordinator::new(&AnimationConfig::default(), VirtualScheduler::new());
        coordinator.step_forward();
        coordinator.step_backward();
        coordinator.seek(5);
        assert_eq!(coordinator.frame_index(), 0);

        coordinator.play();
        assert!(coordinator.is_playing());
        assert!(coordinator.playback_timer().is_none());
    }

    #[test]
    fn test_stale_batch_is_discarded() {
        let mut coordinator = TimelineCoordinator::new(&AnimationConfig::default(), VirtualScheduler::new());
        let first = coordinator.set_active(vec![forecast_request("model", &["a"])]).unwrap();
        let _second = coordinator.refresh().unwrap();

        let outcome = coordinator.apply(ResolvedBatch {
            seq: first.seq,
            outcomes: Vec::new(),
        });
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(coordinator.state(), CoordinatorState::Loading);
    }
}
