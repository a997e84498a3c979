// noFriction Meetings - Event Stream Normalizer
// Converts backend timeline records into offset-based TimelineEvents
//
// Pure, no I/O. Offsets are computed against the meeting's recorded start; records
// stamped before the start are clamped to 0 and flagged rather than rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeline_index::{EventPayload, Stream, TimelineEvent};

/// A single record as delivered by the backend. Every field but the id and timestamp is
/// optional; absent fields stay `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub window_title: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub is_final: Option<bool>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            duration_ms: None,
            text: None,
            speaker: None,
            asset_id: None,
            app_name: None,
            window_title: None,
            confidence: None,
            is_final: None,
        }
    }
}

/// Full timeline payload for one meeting (frames, transcripts, accessibility, screenshots)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTimeline {
    pub meeting_id: String,
    #[serde(default)]
    pub title: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Backend is still appending to this meeting
    #[serde(default)]
    pub is_recording: bool,
    #[serde(default)]
    pub frames: Vec<RawRecord>,
    #[serde(default)]
    pub transcripts: Vec<RawRecord>,
    #[serde(default)]
    pub accessibility: Vec<RawRecord>,
    #[serde(default)]
    pub screenshots: Vec<RawRecord>,
}

impl RawTimeline {
    pub fn empty(meeting_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            meeting_id: meeting_id.to_string(),
            title: String::new(),
            started_at,
            ended_at: None,
            is_recording: false,
            frames: Vec::new(),
            transcripts: Vec::new(),
            accessibility: Vec::new(),
            screenshots: Vec::new(),
        }
    }

    /// Records grouped by stream, consuming the payload
    pub fn into_streams(self) -> Vec<(Stream, Vec<RawRecord>)> {
        vec![
            (Stream::Frame, self.frames),
            (Stream::Transcript, self.transcripts),
            (Stream::Accessibility, self.accessibility),
            (Stream::Screenshot, self.screenshots),
        ]
    }
}

/// Output of a normalization pass
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Unordered events; the index sorts them
    pub events: Vec<TimelineEvent>,
    /// Events whose timestamp preceded the meeting start
    pub clamped: usize,
    /// Records with nothing to show (partial/blank transcripts, imageless screenshots)
    pub dropped: usize,
}

/// Convert raw records into timeline events relative to `meeting_start`
pub fn normalize(
    meeting_start: DateTime<Utc>,
    records_by_stream: impl IntoIterator<Item = (Stream, Vec<RawRecord>)>,
) -> Normalized {
    let mut out = Normalized::default();

    for (stream, records) in records_by_stream {
        for record in records {
            if !is_displayable(stream, &record) {
                out.dropped += 1;
                continue;
            }

            let offset = (record.timestamp - meeting_start).num_milliseconds();
            let clamped = offset < 0;
            if clamped {
                out.clamped += 1;
                log::debug!(
                    "Clamped {} {} ({}ms before meeting start)",
                    stream.as_str(),
                    record.id,
                    -offset
                );
            }

            out.events.push(TimelineEvent {
                id: record.id,
                stream,
                offset_ms: offset.max(0) as u64,
                payload: EventPayload {
                    text: record.text,
                    speaker: record.speaker,
                    asset_id: record.asset_id,
                    duration_ms: record.duration_ms,
                    confidence: record.confidence,
                    app_name: record.app_name,
                    window_title: record.window_title,
                },
                clamped,
            });
        }
    }

    if out.clamped > 0 {
        log::warn!(
            "⚠️ {} timeline records preceded the meeting start and were clamped to 0",
            out.clamped
        );
    }

    out
}

/// Normalize a whole backend timeline payload
pub fn normalize_timeline(timeline: RawTimeline) -> Normalized {
    let start = timeline.started_at;
    normalize(start, timeline.into_streams())
}

fn is_displayable(stream: Stream, record: &RawRecord) -> bool {
    match stream {
        Stream::Transcript => {
            record.is_final != Some(false)
                && record
                    .text
                    .as_deref()
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false)
        }
        Stream::Screenshot => record.asset_id.is_some(),
        Stream::Frame | Stream::Accessibility => true,
    }
}
