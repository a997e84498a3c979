// noFriction Meetings - Meeting Trigger Engine
// Decides when ambient capture should be escalated to a meeting
//
// Features:
// - Calendar event matching (±5 min window)
// - Meeting app detection (Zoom, Meet, Teams, ...), frontmost or with active audio
// - Dismissed suggestions are never re-proposed until cleared
//
// Detection is advisory: a MeetingDetection is handed to the CaptureModeController,
// which only escalates when the always-on master switch is on.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::capture_mode::AlwaysOnSettings;

/// What produced a meeting suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// Calendar event overlapping now
    Calendar,
    /// Meeting app frontmost or holding the microphone
    AppDetection,
    /// User pressed the record button
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub event_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
}

/// Point-in-time view of the desktop, gathered by the platform layer
#[derive(Debug, Clone, Default)]
pub struct ActivitySnapshot {
    pub now: DateTime<Utc>,
    pub frontmost_app: Option<String>,
    pub running_apps: Vec<String>,
    pub audio_active: bool,
    pub calendar_events: Vec<CalendarEvent>,
}

/// Meeting detection (suggestion before recording)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingDetection {
    pub id: String,
    pub detected_at: DateTime<Utc>,
    pub source: TriggerSource,
    pub app_name: Option<String>,
    pub calendar_event: Option<CalendarEvent>,
    pub is_using_audio: bool,
}

impl MeetingDetection {
    /// A user-initiated meeting; always carries a fresh id
    pub fn manual(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("manual-{}", uuid::Uuid::new_v4()),
            detected_at: now,
            source: TriggerSource::Manual,
            app_name: None,
            calendar_event: None,
            is_using_audio: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingTriggerConfig {
    pub calendar_trigger_enabled: bool,
    /// Minutes before/after a calendar event that still count as "in the meeting"
    pub calendar_window_minutes: i64,
    pub app_trigger_enabled: bool,
    /// Case-insensitive substrings matched against app names
    pub meeting_apps: Vec<String>,
}

impl Default for MeetingTriggerConfig {
    fn default() -> Self {
        Self {
            calendar_trigger_enabled: true,
            calendar_window_minutes: 5,
            app_trigger_enabled: true,
            meeting_apps: vec![
                "zoom.us".to_string(),
                "Zoom".to_string(),
                "Google Meet".to_string(),
                "Microsoft Teams".to_string(),
                "Slack".to_string(),
                "Discord".to_string(),
                "FaceTime".to_string(),
                "Webex".to_string(),
            ],
        }
    }
}

/// Meeting detector
pub struct MeetingDetector {
    config: RwLock<MeetingTriggerConfig>,
    /// Detections the user said no to
    dismissed: RwLock<HashSet<String>>,
}

impl MeetingDetector {
    pub fn new() -> Self {
        Self::with_config(MeetingTriggerConfig::default())
    }

    pub fn with_config(config: MeetingTriggerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            dismissed: RwLock::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> MeetingTriggerConfig {
        self.config.read().clone()
    }

    /// Follow the calendar/app detection toggles of the always-on settings
    pub fn apply_settings(&self, settings: &AlwaysOnSettings) {
        let mut config = self.config.write();
        config.calendar_trigger_enabled = settings.calendar_detection;
        config.app_trigger_enabled = settings.app_detection;
    }

    /// Dismiss a detection (user said no)
    pub fn dismiss(&self, detection_id: &str) {
        self.dismissed.write().insert(detection_id.to_string());
        log::info!("🎯 Detection dismissed: {}", detection_id);
    }

    pub fn is_dismissed(&self, detection_id: &str) -> bool {
        self.dismissed.read().contains(detection_id)
    }

    /// Clear dismissed detections (for a new day)
    pub fn clear_dismissed(&self) {
        self.dismissed.write().clear();
    }

    /// Propose a meeting for the given activity, apps first, then calendar
    pub fn detect(&self, snapshot: &ActivitySnapshot) -> Option<MeetingDetection> {
        let config = self.config.read().clone();

        if config.app_trigger_enabled {
            if let Some(detection) = self.detect_app(&config, snapshot) {
                return Some(detection);
            }
        }

        if config.calendar_trigger_enabled {
            if let Some(detection) = self.detect_calendar(&config, snapshot) {
                return Some(detection);
            }
        }

        None
    }

    fn detect_app(
        &self,
        config: &MeetingTriggerConfig,
        snapshot: &ActivitySnapshot,
    ) -> Option<MeetingDetection> {
        let frontmost = snapshot
            .frontmost_app
            .as_deref()
            .filter(|name| is_meeting_app(&config.meeting_apps, name));

        let mut candidates: Vec<&str> = snapshot
            .running_apps
            .iter()
            .map(String::as_str)
            .filter(|name| is_meeting_app(&config.meeting_apps, name))
            .collect();
        if let Some(front) = frontmost {
            if !candidates.iter().any(|c| c.eq_ignore_ascii_case(front)) {
                candidates.insert(0, front);
            }
        }

        for app_name in candidates {
            // Background Teams/Slack is not a meeting
            let is_frontmost = frontmost
                .map(|f| f.eq_ignore_ascii_case(app_name))
                .unwrap_or(false);
            if !is_frontmost && !snapshot.audio_active {
                log::debug!(
                    "🎯 Skipping {} - not frontmost and no audio activity",
                    app_name
                );
                continue;
            }

            let detection_id = format!("app-{}", app_name.to_lowercase().replace(' ', "-"));
            if self.is_dismissed(&detection_id) {
                continue;
            }

            log::info!(
                "🎯 Meeting detected: {} (audio: {})",
                app_name,
                snapshot.audio_active
            );
            return Some(MeetingDetection {
                id: detection_id,
                detected_at: snapshot.now,
                source: TriggerSource::AppDetection,
                app_name: Some(app_name.to_string()),
                calendar_event: None,
                is_using_audio: snapshot.audio_active,
            });
        }

        None
    }

    fn detect_calendar(
        &self,
        config: &MeetingTriggerConfig,
        snapshot: &ActivitySnapshot,
    ) -> Option<MeetingDetection> {
        let window = Duration::minutes(config.calendar_window_minutes);

        let event = snapshot.calendar_events.iter().find(|event| {
            !event.is_all_day
                && snapshot.now >= event.start_time - window
                && snapshot.now <= event.end_time + window
                && !self.is_dismissed(&format!("cal-{}", event.event_id))
        })?;

        log::info!("📅 Calendar meeting detected: {}", event.title);
        Some(MeetingDetection {
            id: format!("cal-{}", event.event_id),
            detected_at: snapshot.now,
            source: TriggerSource::Calendar,
            app_name: None,
            calendar_event: Some(event.clone()),
            is_using_audio: snapshot.audio_active,
        })
    }
}

impl Default for MeetingDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_meeting_app(patterns: &[String], name: &str) -> bool {
    let name = name.to_lowercase();
    patterns.iter().any(|p| name.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn standup(offset_mins: i64) -> CalendarEvent {
        CalendarEvent {
            event_id: "evt-1".to_string(),
            title: "Standup".to_string(),
            start_time: now() + Duration::minutes(offset_mins),
            end_time: now() + Duration::minutes(offset_mins + 15),
            is_all_day: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = MeetingTriggerConfig::default();
        assert!(config.calendar_trigger_enabled);
        assert!(config.app_trigger_enabled);
        assert_eq!(config.calendar_window_minutes, 5);
        assert_eq!(config.meeting_apps.len(), 8);
    }

    #[test]
    fn test_background_meeting_app_is_ignored() {
        let detector = MeetingDetector::new();
        let snapshot = ActivitySnapshot {
            now: now(),
            frontmost_app: Some("Xcode".to_string()),
            running_apps: vec!["Slack".to_string()],
            ..Default::default()
        };
        assert!(detector.detect(&snapshot).is_none());
    }

    #[test]
    fn test_frontmost_or_audio_app_is_detected() {
        let detector = MeetingDetector::new();

        let front = ActivitySnapshot {
            now: now(),
            frontmost_app: Some("zoom.us".to_string()),
            ..Default::default()
        };
        let detection = detector.detect(&front).unwrap();
        assert_eq!(detection.id, "app-zoom.us");
        assert_eq!(detection.source, TriggerSource::AppDetection);

        let audio = ActivitySnapshot {
            now: now(),
            running_apps: vec!["Microsoft Teams".to_string()],
            audio_active: true,
            ..Default::default()
        };
        let detection = detector.detect(&audio).unwrap();
        assert_eq!(detection.id, "app-microsoft-teams");
        assert!(detection.is_using_audio);
    }

    #[test]
    fn test_calendar_window() {
        let detector = MeetingDetector::new();

        let soon = ActivitySnapshot {
            now: now(),
            calendar_events: vec![standup(4)],
            ..Default::default()
        };
        assert_eq!(detector.detect(&soon).unwrap().id, "cal-evt-1");

        let later = ActivitySnapshot {
            now: now(),
            calendar_events: vec![standup(6)],
            ..Default::default()
        };
        assert!(detector.detect(&later).is_none());

        let mut all_day = standup(0);
        all_day.is_all_day = true;
        let holiday = ActivitySnapshot {
            now: now(),
            calendar_events: vec![all_day],
            ..Default::default()
        };
        assert!(detector.detect(&holiday).is_none());
    }

    #[test]
    fn test_dismissed_detection_is_not_reproposed() {
        let detector = MeetingDetector::new();
        let snapshot = ActivitySnapshot {
            now: now(),
            frontmost_app: Some("FaceTime".to_string()),
            calendar_events: vec![standup(0)],
            ..Default::default()
        };

        detector.dismiss("app-facetime");
        assert_eq!(detector.detect(&snapshot).unwrap().id, "cal-evt-1");

        detector.dismiss("cal-evt-1");
        assert!(detector.detect(&snapshot).is_none());

        detector.clear_dismissed();
        assert_eq!(detector.detect(&snapshot).unwrap().id, "app-facetime");
    }

    #[test]
    fn test_settings_toggles_disable_sources() {
        let detector = MeetingDetector::new();
        let settings = AlwaysOnSettings {
            app_detection: false,
            calendar_detection: false,
            ..Default::default()
        };
        detector.apply_settings(&settings);

        let snapshot = ActivitySnapshot {
            now: now(),
            frontmost_app: Some("Zoom".to_string()),
            calendar_events: vec![standup(0)],
            ..Default::default()
        };
        assert!(detector.detect(&snapshot).is_none());
    }

    #[test]
    fn test_manual_detection_ids_are_unique() {
        let a = MeetingDetection::manual(now());
        let b = MeetingDetection::manual(now());
        assert_ne!(a.id, b.id);
        assert_eq!(a.source, TriggerSource::Manual);
    }
}
