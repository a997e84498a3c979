// noFriction Meetings - Rewind Engine
// Shared timeline engine behind every rewind/timeline view
//
// Features:
// - Per-view handles tagged with an epoch; switching meetings invalidates old handles
// - Reloads build the new index off-lock and swap it atomically
// - Late or out-of-order reload results are discarded, never applied
// - Selection and scrub position survive rebuilds
// - Live polling while the meeting is still recording

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::backend::{CaptureBackend, HttpBackend, TimelineBackend};
use crate::capture_mode::{CaptureMode, CaptureModeController};
use crate::config::EngineConfig;
use crate::error::{BackendError, EngineError, EngineResult};
use crate::media_cache::{AssetBytes, AssetVariant, MediaCache};
use crate::normalizer::normalize_timeline;
use crate::timeline_index::{EventKey, Moment, Stream, TimelineEvent, TimelineIndex};

/// A view's claim on a meeting timeline. Becomes stale when the view closes or switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineHandle {
    view: u64,
    epoch: u64,
    meeting_id: String,
}

impl TimelineHandle {
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn view_id(&self) -> u64 {
        self.view
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    /// The result arrived for a meeting the view no longer shows, or after a newer one
    Discarded,
}

/// Last resolved selected event; kept as-is when a rebuild leaves nothing to resolve to
#[derive(Debug, Clone)]
struct Selection {
    event: TimelineEvent,
}

impl Selection {
    fn key(&self) -> EventKey {
        self.event.key()
    }
}

struct ViewState {
    meeting_id: String,
    epoch: u64,
    index: Arc<TimelineIndex>,
    is_recording: bool,
    scrub_ms: u64,
    selection: Option<Selection>,
    /// Last issued reload request
    issued_seq: u64,
    /// Last reload whose result was swapped in
    applied_seq: u64,
    poller: Option<JoinHandle<()>>,
}

impl ViewState {
    fn new(meeting_id: &str, epoch: u64) -> Self {
        Self {
            meeting_id: meeting_id.to_string(),
            epoch,
            index: Arc::new(TimelineIndex::build(Vec::new())),
            is_recording: false,
            scrub_ms: 0,
            selection: None,
            issued_seq: 0,
            applied_seq: 0,
            poller: None,
        }
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

type Views = Arc<RwLock<HashMap<u64, ViewState>>>;

/// Rewind Engine - cheap to clone, shared by all views
#[derive(Clone)]
pub struct RewindEngine {
    config: Arc<EngineConfig>,
    timelines: Arc<dyn TimelineBackend>,
    cache: MediaCache,
    capture: Arc<CaptureModeController>,
    views: Views,
    next_view: Arc<AtomicU64>,
    next_epoch: Arc<AtomicU64>,
}

impl RewindEngine {
    /// Engine over the process-wide capture controller. The first engine installs it over
    /// `capture`; later engines share the same session.
    pub fn new(
        config: EngineConfig,
        timelines: Arc<dyn TimelineBackend>,
        capture: Arc<dyn CaptureBackend>,
    ) -> Self {
        let cache = MediaCache::from_config(timelines.clone(), &config);
        let capture = CaptureModeController::shared(capture);
        Self::with_controller(config, timelines, cache, capture)
    }

    /// Engine over an existing cache and capture controller (e.g. the global one)
    pub fn with_controller(
        config: EngineConfig,
        timelines: Arc<dyn TimelineBackend>,
        cache: MediaCache,
        capture: Arc<CaptureModeController>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            timelines,
            cache,
            capture,
            views: Arc::new(RwLock::new(HashMap::new())),
            next_view: Arc::new(AtomicU64::new(1)),
            next_epoch: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Engine talking to the configured HTTP backend
    pub fn connect(config: EngineConfig) -> Result<Self, BackendError> {
        let backend = Arc::new(HttpBackend::from_config(&config)?);
        log::info!("🔌 Rewind backend: {}", backend.base_url());
        Ok(Self::new(config, backend.clone(), backend))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    pub fn capture(&self) -> Arc<CaptureModeController> {
        self.capture.clone()
    }

    pub fn get_capture_mode(&self) -> CaptureMode {
        self.capture.mode()
    }

    pub async fn request_mode_transition(&self, target: CaptureMode) -> EngineResult<CaptureMode> {
        self.capture.request_transition(target).await
    }

    /// Keep the capture mode in step with the backend on the configured cadence
    pub fn start_mode_polling(&self) {
        self.capture.start_polling(self.config.mode_poll_interval);
    }

    pub fn stop_mode_polling(&self) {
        self.capture.stop_polling();
    }

    // ========================================================================
    // Handles
    // ========================================================================

    pub async fn open_timeline(&self, meeting_id: &str) -> EngineResult<TimelineHandle> {
        let view = self.next_view.fetch_add(1, Ordering::SeqCst);
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        self.views
            .write()
            .insert(view, ViewState::new(meeting_id, epoch));

        let handle = TimelineHandle {
            view,
            epoch,
            meeting_id: meeting_id.to_string(),
        };
        log::info!("🎬 Opening timeline for meeting {} (view {})", meeting_id, view);

        self.load_initial(handle).await
    }

    pub fn close_timeline(&self, handle: &TimelineHandle) -> EngineResult<()> {
        let mut views = self.views.write();
        Self::check(&views, handle)?;
        if let Some(mut view) = views.remove(&handle.view) {
            view.stop_poller();
        }
        drop(views);

        self.cache.unpin(handle.view);
        log::info!("🎬 Closed timeline view {}", handle.view);
        Ok(())
    }

    /// Point an open view at another meeting. The old handle becomes stale.
    pub async fn switch_meeting(
        &self,
        handle: &TimelineHandle,
        meeting_id: &str,
    ) -> EngineResult<TimelineHandle> {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut views = self.views.write();
            Self::check(&views, handle)?;
            if let Some(view) = views.get_mut(&handle.view) {
                view.stop_poller();
                let issued_seq = view.issued_seq;
                *view = ViewState::new(meeting_id, epoch);
                view.issued_seq = issued_seq;
                view.applied_seq = issued_seq;
            }
        }
        self.cache.unpin(handle.view);

        log::info!(
            "🎬 View {} switched {} -> {}",
            handle.view,
            handle.meeting_id,
            meeting_id
        );
        let handle = TimelineHandle {
            view: handle.view,
            epoch,
            meeting_id: meeting_id.to_string(),
        };
        self.load_initial(handle).await
    }

    async fn load_initial(&self, handle: TimelineHandle) -> EngineResult<TimelineHandle> {
        match self.reload(&handle).await {
            Ok(_) => {
                self.start_live_polling(&handle);
                Ok(handle)
            }
            Err(e) => {
                if let Some(mut view) = self.views.write().remove(&handle.view) {
                    view.stop_poller();
                }
                self.cache.unpin(handle.view);
                Err(e)
            }
        }
    }

    fn check(views: &HashMap<u64, ViewState>, handle: &TimelineHandle) -> EngineResult<()> {
        match views.get(&handle.view) {
            Some(view) if view.epoch == handle.epoch => Ok(()),
            _ => Err(EngineError::Stale {
                meeting_id: handle.meeting_id.clone(),
            }),
        }
    }

    fn with_view<T>(
        &self,
        handle: &TimelineHandle,
        f: impl FnOnce(&ViewState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let views = self.views.read();
        Self::check(&views, handle)?;
        match views.get(&handle.view) {
            Some(view) => f(view),
            None => Err(EngineError::Stale {
                meeting_id: handle.meeting_id.clone(),
            }),
        }
    }

    fn with_view_mut<T>(
        &self,
        handle: &TimelineHandle,
        f: impl FnOnce(&mut ViewState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut views = self.views.write();
        Self::check(&views, handle)?;
        match views.get_mut(&handle.view) {
            Some(view) => f(view),
            None => Err(EngineError::Stale {
                meeting_id: handle.meeting_id.clone(),
            }),
        }
    }

    pub fn is_current(&self, handle: &TimelineHandle) -> bool {
        Self::check(&self.views.read(), handle).is_ok()
    }

    // ========================================================================
    // Reload
    // ========================================================================

    /// Fetch, normalize and swap in a fresh index for the handle's meeting
    pub async fn reload(&self, handle: &TimelineHandle) -> EngineResult<ReloadOutcome> {
        let seq = self.with_view_mut(handle, |view| {
            view.issued_seq += 1;
            Ok(view.issued_seq)
        })?;

        let fetched = self.timelines.fetch_timeline(&handle.meeting_id).await;

        // The view may have moved on while we were waiting
        if !self.is_current(handle) {
            log::debug!(
                "Discarding reload #{} for {} (view {} moved on)",
                seq,
                handle.meeting_id,
                handle.view
            );
            return Ok(ReloadOutcome::Discarded);
        }

        let timeline = fetched?;
        let is_recording = timeline.is_recording;
        let normalized = normalize_timeline(timeline);
        let index = Arc::new(TimelineIndex::build(normalized.events));

        let mut views = self.views.write();
        if Self::check(&views, handle).is_err() {
            return Ok(ReloadOutcome::Discarded);
        }
        let Some(view) = views.get_mut(&handle.view) else {
            return Ok(ReloadOutcome::Discarded);
        };
        if seq <= view.applied_seq {
            log::debug!(
                "Discarding reload #{} for {} (#{} already applied)",
                seq,
                handle.meeting_id,
                view.applied_seq
            );
            return Ok(ReloadOutcome::Discarded);
        }

        if let Some(selection) = view.selection.as_mut() {
            match index.resolve_selection(&selection.key(), selection.event.offset_ms) {
                Some(event) => {
                    if event.id != selection.event.id {
                        log::debug!(
                            "Selected {} {} is gone; now {}",
                            event.stream.as_str(),
                            selection.event.id,
                            event.id
                        );
                    }
                    selection.event = event.clone();
                    if let Some(asset_id) = event.payload.asset_id.as_deref() {
                        self.cache.pin(handle.view, asset_id, AssetVariant::Full);
                    }
                }
                None => log::debug!(
                    "Keeping selected {} {} (stream is empty)",
                    selection.event.stream.as_str(),
                    selection.event.id
                ),
            }
        }

        view.scrub_ms = view.scrub_ms.min(index.duration_ms());
        view.is_recording = is_recording;
        view.applied_seq = seq;
        view.index = index;

        log::debug!(
            "Timeline {} reloaded: {} events, {}ms",
            handle.meeting_id,
            view.index.total_len(),
            view.index.duration_ms()
        );
        Ok(ReloadOutcome::Applied)
    }

    /// Whether the handle's meeting is still being recorded
    pub fn is_live(&self, handle: &TimelineHandle) -> EngineResult<bool> {
        self.with_view(handle, |view| Ok(view.is_recording))
    }

    fn start_live_polling(&self, handle: &TimelineHandle) {
        let mut views = self.views.write();
        if Self::check(&views, handle).is_err() {
            return;
        }
        let Some(view) = views.get_mut(&handle.view) else {
            return;
        };
        if !view.is_recording || view.poller.is_some() {
            return;
        }

        log::info!(
            "🔴 Meeting {} is recording; polling every {}ms",
            handle.meeting_id,
            self.config.live_poll_interval.as_millis()
        );
        view.poller = Some(tokio::spawn(poll_live(self.clone(), handle.clone())));
    }

    fn clear_poller(&self, handle: &TimelineHandle) {
        let _ = self.with_view_mut(handle, |view| {
            view.poller = None;
            Ok(())
        });
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self, handle: &TimelineHandle) -> EngineResult<Arc<TimelineIndex>> {
        self.with_view(handle, |view| Ok(view.index.clone()))
    }

    /// The event a view shows for `stream` at position `t`
    pub fn query_at(
        &self,
        handle: &TimelineHandle,
        stream: Stream,
        t: u64,
    ) -> EngineResult<TimelineEvent> {
        let index = self.snapshot(handle)?;
        index
            .query_at(stream, t, self.config.transcript_tolerance_ms)
            .cloned()
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "{} at {}ms in {}",
                    stream.as_str(),
                    t,
                    handle.meeting_id
                ))
            })
    }

    /// Events of `stream` in `[t0, t1)`
    pub fn query_window(
        &self,
        handle: &TimelineHandle,
        stream: Stream,
        t0: u64,
        t1: u64,
    ) -> EngineResult<Vec<TimelineEvent>> {
        let index = self.snapshot(handle)?;
        Ok(index.events_in_window(stream, t0, t1).to_vec())
    }

    pub fn moment_at(&self, handle: &TimelineHandle, t: u64) -> EngineResult<Moment> {
        let index = self.snapshot(handle)?;
        Ok(index.moment_at(t, self.config.transcript_tolerance_ms))
    }

    pub fn duration_ms(&self, handle: &TimelineHandle) -> EngineResult<u64> {
        self.with_view(handle, |view| Ok(view.index.duration_ms()))
    }

    // ========================================================================
    // Scrub & selection
    // ========================================================================

    /// Move the playhead; clamped to the timeline. Returns the applied position.
    pub fn set_scrub_position(&self, handle: &TimelineHandle, t: u64) -> EngineResult<u64> {
        self.with_view_mut(handle, |view| {
            view.scrub_ms = t.min(view.index.duration_ms());
            Ok(view.scrub_ms)
        })
    }

    pub fn scrub_position(&self, handle: &TimelineHandle) -> EngineResult<u64> {
        self.with_view(handle, |view| Ok(view.scrub_ms))
    }

    /// Select an event: the playhead jumps to it and its image stays cached while shown
    pub fn select(
        &self,
        handle: &TimelineHandle,
        stream: Stream,
        event_id: &str,
    ) -> EngineResult<TimelineEvent> {
        let event = self.with_view_mut(handle, |view| {
            let event = view
                .index
                .find(stream, event_id)
                .cloned()
                .ok_or_else(|| {
                    EngineError::NotFound(format!("{} {}", stream.as_str(), event_id))
                })?;
            view.selection = Some(Selection {
                event: event.clone(),
            });
            view.scrub_ms = event.offset_ms;
            Ok(event)
        })?;

        match event.payload.asset_id.as_deref() {
            Some(asset_id) => self.cache.pin(handle.view, asset_id, AssetVariant::Full),
            None => self.cache.unpin(handle.view),
        }
        Ok(event)
    }

    /// Currently selected event, as re-resolved after the latest rebuild. If its stream
    /// emptied out, the last resolved event is returned.
    pub fn selection(&self, handle: &TimelineHandle) -> EngineResult<Option<TimelineEvent>> {
        self.with_view(handle, |view| {
            Ok(view.selection.as_ref().map(|s| {
                view.index
                    .find(s.event.stream, &s.event.id)
                    .cloned()
                    .unwrap_or_else(|| s.event.clone())
            }))
        })
    }

    pub fn clear_selection(&self, handle: &TimelineHandle) -> EngineResult<()> {
        self.with_view_mut(handle, |view| {
            view.selection = None;
            Ok(())
        })?;
        self.cache.unpin(handle.view);
        Ok(())
    }

    // ========================================================================
    // Assets
    // ========================================================================

    pub async fn get_asset(&self, asset_id: &str, variant: AssetVariant) -> EngineResult<AssetBytes> {
        self.cache.get(asset_id, variant).await
    }

    /// Queue thumbnails for the frames and screenshots in `[t0, t1)`.
    /// Queued fetches are dropped once the handle goes stale.
    pub fn prefetch_thumbnails(&self, handle: &TimelineHandle, t0: u64, t1: u64) -> EngineResult<usize> {
        let index = self.snapshot(handle)?;
        let asset_ids: Vec<String> = [Stream::Frame, Stream::Screenshot]
            .into_iter()
            .flat_map(|stream| index.events_in_window(stream, t0, t1))
            .filter_map(|e| e.payload.asset_id.clone())
            .collect();

        let views = self.views.clone();
        let handle = handle.clone();
        let is_relevant = move || Self::check(&views.read(), &handle).is_ok();

        Ok(self
            .cache
            .prefetch_window(asset_ids, AssetVariant::Thumbnail, is_relevant))
    }
}

async fn poll_live(engine: RewindEngine, handle: TimelineHandle) {
    let interval = engine.config.live_poll_interval;

    loop {
        tokio::time::sleep(interval).await;

        match engine.reload(&handle).await {
            Ok(_) => {}
            Err(EngineError::Stale { .. }) => return,
            Err(EngineError::NotFound(what)) => {
                log::warn!("⚠️ Live meeting disappeared: {}", what);
                break;
            }
            Err(e) => log::warn!("⚠️ Live poll for {} failed: {}", handle.meeting_id, e),
        }

        match engine.is_live(&handle) {
            Ok(true) => continue,
            Ok(false) => {
                log::info!("⏹️ Meeting {} stopped recording", handle.meeting_id);
                break;
            }
            Err(_) => return,
        }
    }

    engine.clear_poller(&handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::normalizer::{RawRecord, RawTimeline};
    use chrono::{DateTime, Duration, Utc};

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(id: &str, ms: i64) -> RawRecord {
        RawRecord::new(id, start() + Duration::milliseconds(ms))
    }

    fn frame(id: &str, ms: i64) -> RawRecord {
        let mut r = at(id, ms);
        r.asset_id = Some(format!("asset-{}", id));
        r
    }

    fn said(id: &str, ms: i64, dur: u64, text: &str) -> RawRecord {
        let mut r = at(id, ms);
        r.duration_ms = Some(dur);
        r.text = Some(text.to_string());
        r
    }

    fn meeting_a() -> RawTimeline {
        let mut t = RawTimeline::empty("A", start());
        t.frames = vec![frame("f0", 0), frame("f5", 5_000)];
        t.transcripts = vec![said("t1", 2_500, 1_800, "quarterly numbers")];
        t
    }

    fn meeting_b() -> RawTimeline {
        let mut t = RawTimeline::empty("B", start());
        t.frames = vec![frame("b0", 0), frame("b1", 1_000)];
        t
    }

    fn engine_with(backend: Arc<MockBackend>, config: EngineConfig) -> RewindEngine {
        let cache = MediaCache::from_config(backend.clone(), &config);
        let capture = Arc::new(CaptureModeController::new(backend.clone()));
        RewindEngine::with_controller(config, backend, cache, capture)
    }

    fn engine(backend: Arc<MockBackend>) -> RewindEngine {
        engine_with(backend, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_frame_and_transcript_at_same_position() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend);
        let handle = engine.open_timeline("A").await.unwrap();

        let spoken = engine.query_at(&handle, Stream::Transcript, 3_000).unwrap();
        assert_eq!(spoken.id, "t1");
        let shown = engine.query_at(&handle, Stream::Frame, 3_000).unwrap();
        assert_eq!(shown.id, "f0");

        let moment = engine.moment_at(&handle, 3_000).unwrap();
        assert_eq!(moment.frame.unwrap().id, "f0");
        assert_eq!(moment.transcript.unwrap().id, "t1");
        assert!(moment.screenshot.is_none());
    }

    #[tokio::test]
    async fn test_unknown_meeting_is_not_found() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine(backend);

        let err = engine.open_timeline("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_stream_is_not_found() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_b()));
        let engine = engine(backend);
        let handle = engine.open_timeline("B").await.unwrap();

        let err = engine
            .query_at(&handle, Stream::Transcript, 500)
            .unwrap_err();
        assert!(err.is_silent());
        assert!(engine
            .query_window(&handle, Stream::Screenshot, 0, 10_000)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_late_reload_for_previous_meeting_is_discarded() {
        let backend = Arc::new(
            MockBackend::new()
                .with_timeline(meeting_a())
                .with_timeline(meeting_b()),
        );
        let engine = engine(backend.clone());
        let handle_a = engine.open_timeline("A").await.unwrap();

        backend
            .timeline_delays
            .lock()
            .insert("A".to_string(), std::time::Duration::from_millis(100));
        let pending = {
            let engine = engine.clone();
            let handle_a = handle_a.clone();
            tokio::spawn(async move { engine.reload(&handle_a).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let handle_b = engine.switch_meeting(&handle_a, "B").await.unwrap();
        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, ReloadOutcome::Discarded);

        let index = engine.snapshot(&handle_b).unwrap();
        assert!(index.find(Stream::Frame, "b1").is_some());
        assert!(index.find(Stream::Frame, "f5").is_none());

        assert!(matches!(
            engine.query_at(&handle_a, Stream::Frame, 0),
            Err(EngineError::Stale { .. })
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_reloads_keep_newest() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend.clone());
        let handle = engine.open_timeline("A").await.unwrap();

        // First reload is slow and sees the old data
        backend
            .timeline_delays
            .lock()
            .insert("A".to_string(), std::time::Duration::from_millis(100));
        let slow = {
            let engine = engine.clone();
            let handle = handle.clone();
            tokio::spawn(async move { engine.reload(&handle).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        backend.timeline_delays.lock().clear();
        backend
            .timelines
            .lock()
            .get_mut("A")
            .unwrap()
            .frames
            .push(frame("f9", 9_000));
        assert_eq!(engine.reload(&handle).await.unwrap(), ReloadOutcome::Applied);

        assert_eq!(slow.await.unwrap().unwrap(), ReloadOutcome::Discarded);
        assert!(engine
            .snapshot(&handle)
            .unwrap()
            .find(Stream::Frame, "f9")
            .is_some());
    }

    #[tokio::test]
    async fn test_selection_survives_rebuild() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend.clone());
        let handle = engine.open_timeline("A").await.unwrap();

        let selected = engine.select(&handle, Stream::Frame, "f5").unwrap();
        assert_eq!(engine.scrub_position(&handle).unwrap(), 5_000);
        assert_eq!(selected.payload.asset_id.as_deref(), Some("asset-f5"));

        // Same id still present
        backend
            .timelines
            .lock()
            .get_mut("A")
            .unwrap()
            .frames
            .push(frame("f7", 7_000));
        engine.reload(&handle).await.unwrap();
        assert_eq!(engine.selection(&handle).unwrap().unwrap().id, "f5");

        // Selected frame removed: falls back to the frame at or before its offset
        backend
            .timelines
            .lock()
            .get_mut("A")
            .unwrap()
            .frames
            .retain(|f| f.id != "f5");
        engine.reload(&handle).await.unwrap();
        assert_eq!(engine.selection(&handle).unwrap().unwrap().id, "f0");
    }

    #[tokio::test]
    async fn test_selection_kept_when_stream_empties() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend.clone());
        let handle = engine.open_timeline("A").await.unwrap();
        engine.select(&handle, Stream::Frame, "f5").unwrap();

        backend.timelines.lock().get_mut("A").unwrap().frames.clear();
        assert_eq!(engine.reload(&handle).await.unwrap(), ReloadOutcome::Applied);

        let selected = engine.selection(&handle).unwrap().unwrap();
        assert_eq!(selected.id, "f5");
        assert_eq!(selected.offset_ms, 5_000);
        assert_eq!(engine.snapshot(&handle).unwrap().len(Stream::Frame), 0);

        // Frames come back: the selection resolves against the new index again
        backend
            .timelines
            .lock()
            .get_mut("A")
            .unwrap()
            .frames
            .push(frame("f4", 4_000));
        engine.reload(&handle).await.unwrap();
        assert_eq!(engine.selection(&handle).unwrap().unwrap().id, "f4");
    }

    #[tokio::test]
    async fn test_scrub_is_clamped_to_duration() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend.clone());
        let handle = engine.open_timeline("A").await.unwrap();

        assert_eq!(engine.set_scrub_position(&handle, 60_000).unwrap(), 5_000);
        assert_eq!(engine.duration_ms(&handle).unwrap(), 5_000);

        // Timeline shrinks below the playhead
        backend
            .timelines
            .lock()
            .get_mut("A")
            .unwrap()
            .frames
            .truncate(1);
        engine.reload(&handle).await.unwrap();
        assert_eq!(engine.scrub_position(&handle).unwrap(), 4_300);
    }

    #[tokio::test]
    async fn test_selected_asset_is_pinned() {
        let backend = Arc::new(
            MockBackend::new()
                .with_timeline(meeting_a())
                .with_asset("asset-f0", 100)
                .with_asset("asset-f5", 100),
        );
        let config = EngineConfig {
            cache_budget_bytes: 150,
            ..Default::default()
        };
        let engine = engine_with(backend.clone(), config);
        let handle = engine.open_timeline("A").await.unwrap();

        engine.select(&handle, Stream::Frame, "f0").unwrap();
        engine.get_asset("asset-f0", AssetVariant::Full).await.unwrap();
        engine.get_asset("asset-f5", AssetVariant::Full).await.unwrap();

        assert!(engine
            .cache()
            .get_cached("asset-f0", AssetVariant::Full)
            .is_some());
        assert!(engine.cache().stats().total_bytes <= 150);

        engine.close_timeline(&handle).unwrap();
        assert_eq!(engine.cache().stats().pinned, 0);
    }

    #[tokio::test]
    async fn test_closed_handle_is_stale() {
        let backend = Arc::new(MockBackend::new().with_timeline(meeting_a()));
        let engine = engine(backend);
        let handle = engine.open_timeline("A").await.unwrap();

        engine.close_timeline(&handle).unwrap();
        assert!(matches!(
            engine.reload(&handle).await,
            Err(EngineError::Stale { .. })
        ));
        assert!(engine.close_timeline(&handle).is_err());
    }

    #[tokio::test]
    async fn test_live_polling_picks_up_new_events() {
        let mut live = meeting_a();
        live.is_recording = true;
        let backend = Arc::new(MockBackend::new().with_timeline(live));
        let config = EngineConfig {
            live_poll_interval: std::time::Duration::from_millis(20),
            ..Default::default()
        };
        let engine = engine_with(backend.clone(), config);
        let handle = engine.open_timeline("A").await.unwrap();
        assert!(engine.is_live(&handle).unwrap());

        {
            let mut timelines = backend.timelines.lock();
            let timeline = timelines.get_mut("A").unwrap();
            timeline.frames.push(frame("f8", 8_000));
            timeline.is_recording = false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(engine
            .snapshot(&handle)
            .unwrap()
            .find(Stream::Frame, "f8")
            .is_some());
        assert!(!engine.is_live(&handle).unwrap());

        // Recording ended: no more fetches
        let fetches = backend
            .timeline_fetches
            .load(std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert_eq!(
            backend
                .timeline_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            fetches
        );
    }

    #[tokio::test]
    async fn test_prefetch_thumbnails_in_window() {
        let backend = Arc::new(
            MockBackend::new()
                .with_timeline(meeting_a())
                .with_asset("asset-f0", 10)
                .with_asset("asset-f5", 10),
        );
        let engine = engine(backend.clone());
        let handle = engine.open_timeline("A").await.unwrap();

        assert_eq!(engine.prefetch_thumbnails(&handle, 0, 1_000).unwrap(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(engine
            .cache()
            .get_cached("asset-f0", AssetVariant::Thumbnail)
            .is_some());
        assert_eq!(
            *backend.fetch_log.lock(),
            vec![("asset-f0".to_string(), AssetVariant::Thumbnail)]
        );
    }

    #[tokio::test]
    async fn test_capture_mode_through_engine() {
        let backend = Arc::new(MockBackend::new());
        let engine = engine(backend);

        assert_eq!(engine.get_capture_mode(), CaptureMode::Paused);
        engine
            .request_mode_transition(CaptureMode::Ambient)
            .await
            .unwrap();
        assert_eq!(engine.capture().mode(), CaptureMode::Ambient);
    }

    #[test]
    fn test_connect_requires_backend_url() {
        let config = EngineConfig {
            backend_url: None,
            ..Default::default()
        };
        assert!(matches!(
            RewindEngine::connect(config),
            Err(BackendError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_engines_share_process_capture_session() {
        let backend = Arc::new(MockBackend::new());
        let first = RewindEngine::new(EngineConfig::default(), backend.clone(), backend.clone());
        let second = RewindEngine::new(EngineConfig::default(), backend.clone(), backend);

        assert!(Arc::ptr_eq(&first.capture(), &second.capture()));
        assert!(CaptureModeController::global().is_some_and(|g| Arc::ptr_eq(&g, &first.capture())));

        let target = match first.get_capture_mode() {
            CaptureMode::Meeting => CaptureMode::Paused,
            _ => CaptureMode::Meeting,
        };
        first.request_mode_transition(target).await.unwrap();
        assert_eq!(second.get_capture_mode(), target);
    }

    #[tokio::test]
    async fn test_mode_polling_adopts_backend_mode() {
        let backend = Arc::new(MockBackend::new());
        *backend.remote_mode.lock() = CaptureMode::Meeting;
        let config = EngineConfig {
            mode_poll_interval: std::time::Duration::from_millis(10),
            ..Default::default()
        };
        let engine = engine_with(backend, config);

        engine.start_mode_polling();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(engine.get_capture_mode(), CaptureMode::Meeting);
        engine.stop_mode_polling();
    }
}
