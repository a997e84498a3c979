// noFriction Meetings - Timeline Index
// Per-stream sorted event sequences for rewind scrubbing
//
// This module provides:
// 1. The merged TimelineEvent shape shared by all rewind views
// 2. O(log n) point queries ("what was on screen at T", "what was being said at T")
// 3. Half-open range queries for markers and windowed thumbnail grids
// 4. Selection re-resolution after a wholesale rebuild

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum reported duration so UI scaling never divides by zero
pub const MIN_DURATION_MS: u64 = 1_000;

/// Event stream a timeline event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    /// Video frame sampled during recording
    Frame,
    /// Transcript segment
    Transcript,
    /// Accessibility text capture
    Accessibility,
    /// Screenshot with an image asset
    Screenshot,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Frame,
        Stream::Transcript,
        Stream::Accessibility,
        Stream::Screenshot,
    ];

    fn slot(self) -> usize {
        match self {
            Self::Frame => 0,
            Self::Transcript => 1,
            Self::Accessibility => 2,
            Self::Screenshot => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Transcript => "transcript",
            Self::Accessibility => "accessibility",
            Self::Screenshot => "screenshot",
        }
    }

    /// Streams whose events span time and are looked up by distance
    pub fn is_spoken_or_textual(&self) -> bool {
        matches!(self, Self::Transcript | Self::Accessibility)
    }
}

/// Stream-specific fields. Only `duration_ms` is interpreted by the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub text: Option<String>,
    pub speaker: Option<String>,
    pub asset_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub confidence: Option<f32>,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
}

/// A single event on the merged timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub stream: Stream,
    /// Milliseconds since the meeting's recorded start
    pub offset_ms: u64,
    pub payload: EventPayload,
    /// Raw timestamp preceded the meeting start and was clamped to 0
    #[serde(default)]
    pub clamped: bool,
}

impl TimelineEvent {
    pub fn new(stream: Stream, id: impl Into<String>, offset_ms: u64) -> Self {
        Self {
            id: id.into(),
            stream,
            offset_ms,
            payload: EventPayload::default(),
            clamped: false,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.payload.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.payload.text = Some(text.to_string());
        self
    }

    pub fn with_asset(mut self, asset_id: &str) -> Self {
        self.payload.asset_id = Some(asset_id.to_string());
        self
    }

    /// End of the active interval (equal to the offset for point events)
    pub fn end_ms(&self) -> u64 {
        self.offset_ms
            .saturating_add(self.payload.duration_ms.unwrap_or(0))
    }

    /// Whether `t` falls inside this event's `[offset, offset + duration]` interval.
    /// Point events have no interval.
    pub fn covers(&self, t: u64) -> bool {
        match self.payload.duration_ms {
            Some(d) if d > 0 => t >= self.offset_ms && t <= self.offset_ms.saturating_add(d),
            _ => false,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            stream: self.stream,
            id: self.id.clone(),
        }
    }
}

/// Identifies an event across rebuilds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub stream: Stream,
    pub id: String,
}

/// One event per stream at a scrub position
#[derive(Debug, Clone, Default, Serialize)]
pub struct Moment {
    pub position_ms: u64,
    pub frame: Option<TimelineEvent>,
    pub transcript: Option<TimelineEvent>,
    pub accessibility: Option<TimelineEvent>,
    pub screenshot: Option<TimelineEvent>,
}

#[derive(Debug, Clone, Default)]
struct StreamSeq {
    events: Vec<TimelineEvent>,
    reach: ReachTree,
    positions: HashMap<String, usize>,
}

impl StreamSeq {
    fn from_events(mut events: Vec<TimelineEvent>) -> Self {
        events.sort_by(|a, b| a.offset_ms.cmp(&b.offset_ms).then_with(|| a.id.cmp(&b.id)));

        let reach = ReachTree::build(&events);

        let positions = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        Self {
            events,
            reach,
            positions,
        }
    }

    /// Number of events with `offset_ms <= t`
    fn upper(&self, t: u64) -> usize {
        self.events.partition_point(|e| e.offset_ms <= t)
    }

    fn lower(&self, t: u64) -> usize {
        self.events.partition_point(|e| e.offset_ms < t)
    }
}

/// Max tree over how far each interval event reaches (`end + 1`, 0 for point events),
/// in sorted order. Finds the latest-starting interval covering `t` in O(log n).
#[derive(Debug, Clone, Default)]
struct ReachTree {
    size: usize,
    reach: Vec<u64>,
}

impl ReachTree {
    fn build(events: &[TimelineEvent]) -> Self {
        let size = events.len().next_power_of_two();
        let mut reach = vec![0; 2 * size];
        for (i, e) in events.iter().enumerate() {
            if e.payload.duration_ms.unwrap_or(0) > 0 {
                reach[size + i] = e.end_ms().saturating_add(1);
            }
        }
        for node in (1..size).rev() {
            reach[node] = reach[2 * node].max(reach[2 * node + 1]);
        }
        Self { size, reach }
    }

    /// Rightmost index below `limit` whose interval reaches `t`
    fn rightmost_reaching(&self, limit: usize, t: u64) -> Option<usize> {
        if self.reach.is_empty() {
            return None;
        }
        self.descend(1, 0, self.size, limit, t)
    }

    fn descend(&self, node: usize, lo: usize, hi: usize, limit: usize, t: u64) -> Option<usize> {
        if lo >= limit || self.reach[node] <= t {
            return None;
        }
        if hi - lo == 1 {
            return Some(lo);
        }
        let mid = (lo + hi) / 2;
        self.descend(2 * node + 1, mid, hi, limit, t)
            .or_else(|| self.descend(2 * node, lo, mid, limit, t))
    }
}

/// Immutable, per-meeting index of timeline events.
///
/// Built wholesale from a full event list; readers share it behind an `Arc` so a rebuild
/// never exposes a partially built index.
#[derive(Debug, Clone, Default)]
pub struct TimelineIndex {
    streams: [StreamSeq; 4],
    duration_ms: u64,
}

impl TimelineIndex {
    /// Group by stream, drop duplicate ids (the later record wins), sort and measure.
    pub fn build(events: Vec<TimelineEvent>) -> Self {
        let mut grouped: [Vec<TimelineEvent>; 4] = Default::default();
        let mut seen: [HashMap<String, usize>; 4] = Default::default();
        let mut duplicates = 0usize;

        for event in events {
            let slot = event.stream.slot();
            match seen[slot].get(&event.id) {
                Some(&i) => {
                    grouped[slot][i] = event;
                    duplicates += 1;
                }
                None => {
                    seen[slot].insert(event.id.clone(), grouped[slot].len());
                    grouped[slot].push(event);
                }
            }
        }

        if duplicates > 0 {
            log::debug!("📊 Timeline build replaced {} duplicate events", duplicates);
        }

        let duration_ms = grouped
            .iter()
            .flatten()
            .map(TimelineEvent::end_ms)
            .max()
            .unwrap_or(0)
            .max(MIN_DURATION_MS);

        Self {
            streams: grouped.map(StreamSeq::from_events),
            duration_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn events(&self, stream: Stream) -> &[TimelineEvent] {
        &self.streams[stream.slot()].events
    }

    pub fn len(&self, stream: Stream) -> usize {
        self.events(stream).len()
    }

    pub fn total_len(&self) -> usize {
        self.streams.iter().map(|s| s.events.len()).sum()
    }

    /// True when no stream holds any event (an existing meeting with nothing captured yet)
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn position_of(&self, stream: Stream, id: &str) -> Option<usize> {
        self.streams[stream.slot()].positions.get(id).copied()
    }

    pub fn find(&self, stream: Stream, id: &str) -> Option<&TimelineEvent> {
        self.position_of(stream, id)
            .map(|i| &self.streams[stream.slot()].events[i])
    }

    /// The event with the greatest offset `<= t`, or the first event when `t` precedes
    /// all of them. `None` only for an empty stream.
    pub fn nearest_at_or_before(&self, stream: Stream, t: u64) -> Option<&TimelineEvent> {
        let seq = &self.streams[stream.slot()];
        match seq.upper(t) {
            0 => seq.events.first(),
            n => seq.events.get(n - 1),
        }
    }

    /// The event closest to `t`, preferring an interval event that covers `t` over any
    /// nearer point event. Point candidates farther than `tolerance_ms` are rejected.
    pub fn nearest_by_distance(
        &self,
        stream: Stream,
        t: u64,
        tolerance_ms: u64,
    ) -> Option<&TimelineEvent> {
        let seq = &self.streams[stream.slot()];
        if seq.events.is_empty() {
            return None;
        }

        let upper = seq.upper(t);

        // Latest-starting interval that covers t
        if let Some(i) = seq.reach.rightmost_reaching(upper, t) {
            return seq.events.get(i);
        }

        let before = upper.checked_sub(1).map(|i| &seq.events[i]);
        let after = seq.events.get(upper);

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if t - b.offset_ms <= a.offset_ms - t {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        (best.offset_ms.abs_diff(t) <= tolerance_ms).then_some(best)
    }

    /// Events with `t0 <= offset < t1`
    pub fn events_in_window(&self, stream: Stream, t0: u64, t1: u64) -> &[TimelineEvent] {
        let seq = &self.streams[stream.slot()];
        if t1 <= t0 {
            return &[];
        }
        let start = seq.lower(t0);
        let end = seq.lower(t1);
        &seq.events[start..end]
    }

    /// Stream-appropriate lookup: distance for spoken/textual streams, most recent entry
    /// for visual streams.
    pub fn query_at(&self, stream: Stream, t: u64, tolerance_ms: u64) -> Option<&TimelineEvent> {
        if stream.is_spoken_or_textual() {
            self.nearest_by_distance(stream, t, tolerance_ms)
        } else {
            self.nearest_at_or_before(stream, t)
        }
    }

    /// Everything the rewind view shows at position `t`
    pub fn moment_at(&self, t: u64, tolerance_ms: u64) -> Moment {
        let at = |stream| self.query_at(stream, t, tolerance_ms).cloned();
        Moment {
            position_ms: t,
            frame: at(Stream::Frame),
            transcript: at(Stream::Transcript),
            accessibility: at(Stream::Accessibility),
            screenshot: at(Stream::Screenshot),
        }
    }

    /// Re-locate a previously selected event after a rebuild: same id if still present,
    /// otherwise the event at or before its former offset.
    pub fn resolve_selection(&self, key: &EventKey, former_offset_ms: u64) -> Option<&TimelineEvent> {
        self.find(key.stream, &key.id)
            .or_else(|| self.nearest_at_or_before(key.stream, former_offset_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, at: u64) -> TimelineEvent {
        TimelineEvent::new(Stream::Frame, id, at)
    }

    fn transcript(id: &str, at: u64, dur: u64) -> TimelineEvent {
        TimelineEvent::new(Stream::Transcript, id, at)
            .with_duration(dur)
            .with_text("hello")
    }

    fn scenario_index() -> TimelineIndex {
        TimelineIndex::build(vec![
            frame("f5000", 5000),
            transcript("t2500", 2500, 1800),
            frame("f0", 0),
        ])
    }

    #[test]
    fn test_scenario_frame_and_transcript() {
        let index = scenario_index();

        let t = index.query_at(Stream::Transcript, 3000, 0).unwrap();
        assert_eq!(t.id, "t2500");

        let f = index.nearest_at_or_before(Stream::Frame, 3000).unwrap();
        assert_eq!(f.id, "f0");
    }

    #[test]
    fn test_nearest_at_or_before_matches_linear_scan() {
        let offsets = [0u64, 10, 10, 250, 900, 901, 5_000];
        let events: Vec<_> = offsets
            .iter()
            .enumerate()
            .map(|(i, &o)| frame(&format!("f{}", i), o))
            .collect();
        let index = TimelineIndex::build(events);
        let sorted = index.events(Stream::Frame);

        for t in [0u64, 5, 10, 11, 249, 250, 899, 900, 4_999, 5_000, 9_999] {
            let expected = sorted
                .iter()
                .filter(|e| e.offset_ms <= t)
                .last()
                .or(sorted.first())
                .unwrap();
            let got = index.nearest_at_or_before(Stream::Frame, t).unwrap();
            assert_eq!(got.offset_ms, expected.offset_ms, "t = {}", t);
            assert!(got.offset_ms <= t || t < sorted[0].offset_ms);
        }
    }

    #[test]
    fn test_before_first_event_falls_back_to_first() {
        let index = TimelineIndex::build(vec![frame("a", 400), frame("b", 800)]);
        assert_eq!(index.nearest_at_or_before(Stream::Frame, 0).unwrap().id, "a");
    }

    #[test]
    fn test_empty_stream_returns_none() {
        let index = scenario_index();
        assert!(index.nearest_at_or_before(Stream::Screenshot, 100).is_none());
        assert!(index.nearest_by_distance(Stream::Screenshot, 100, 10_000).is_none());
        assert!(index.events_in_window(Stream::Screenshot, 0, 10_000).is_empty());
    }

    #[test]
    fn test_interval_beats_nearer_point_event() {
        let index = TimelineIndex::build(vec![
            transcript("long", 1_000, 5_000),
            TimelineEvent::new(Stream::Transcript, "point", 4_900),
        ]);
        // 4_800 is 100ms from the point event but inside the long interval
        let got = index.nearest_by_distance(Stream::Transcript, 4_800, 10_000).unwrap();
        assert_eq!(got.id, "long");
    }

    #[test]
    fn test_long_interval_covers_dense_point_events() {
        let mut events = vec![transcript("hour", 0, 3_600_000)];
        events.extend((1..2_000u64).map(|i| {
            TimelineEvent::new(Stream::Transcript, &format!("p{}", i), i * 1_000)
        }));
        events.push(transcript("late", 1_500_000, 2_000));
        let index = TimelineIndex::build(events);

        assert_eq!(
            index.nearest_by_distance(Stream::Transcript, 1_000_500, 100).unwrap().id,
            "hour"
        );
        assert_eq!(
            index.nearest_by_distance(Stream::Transcript, 1_501_000, 100).unwrap().id,
            "late"
        );
        assert!(index
            .nearest_by_distance(Stream::Transcript, 3_700_000, 100)
            .is_none());
    }

    #[test]
    fn test_distance_respects_tolerance() {
        let index = TimelineIndex::build(vec![TimelineEvent::new(Stream::Transcript, "p", 1_000)]);
        assert!(index.nearest_by_distance(Stream::Transcript, 4_000, 2_000).is_none());
        assert_eq!(
            index.nearest_by_distance(Stream::Transcript, 2_500, 2_000).unwrap().id,
            "p"
        );
    }

    #[test]
    fn test_window_is_half_open() {
        let index = TimelineIndex::build(vec![frame("a", 0), frame("b", 1_000), frame("c", 2_000)]);
        let ids: Vec<_> = index
            .events_in_window(Stream::Frame, 0, 2_000)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(index.events_in_window(Stream::Frame, 2_000, 1_000).is_empty());
    }

    #[test]
    fn test_duration_floor_and_interval_end() {
        assert_eq!(TimelineIndex::build(vec![]).duration_ms(), MIN_DURATION_MS);
        assert_eq!(scenario_index().duration_ms(), 5_000);

        let index = TimelineIndex::build(vec![transcript("t", 9_000, 2_000)]);
        assert_eq!(index.duration_ms(), 11_000);
    }

    #[test]
    fn test_duplicate_ids_keep_latest_record() {
        let index = TimelineIndex::build(vec![frame("a", 100), frame("a", 700), frame("b", 300)]);
        assert_eq!(index.len(Stream::Frame), 2);
        assert_eq!(index.find(Stream::Frame, "a").unwrap().offset_ms, 700);
        assert_eq!(index.position_of(Stream::Frame, "a"), Some(1));
    }

    #[test]
    fn test_resolve_selection_after_rebuild() {
        let old = TimelineIndex::build(vec![frame("a", 0), frame("b", 3_000)]);
        let selected = old.find(Stream::Frame, "b").unwrap().clone();

        // Still present: same id
        let grown = TimelineIndex::build(vec![frame("a", 0), frame("b", 3_000), frame("c", 6_000)]);
        assert_eq!(grown.resolve_selection(&selected.key(), 3_000).unwrap().id, "b");

        // Gone: nearest at or before the former offset, never the start by default
        let replaced = TimelineIndex::build(vec![frame("a", 0), frame("x", 2_900), frame("c", 6_000)]);
        assert_eq!(replaced.resolve_selection(&selected.key(), 3_000).unwrap().id, "x");
    }

    #[test]
    fn test_moment_at_collects_each_stream() {
        let index = scenario_index();
        let moment = index.moment_at(3_000, 500);
        assert_eq!(moment.frame.unwrap().id, "f0");
        assert_eq!(moment.transcript.unwrap().id, "t2500");
        assert!(moment.screenshot.is_none());
    }
}
