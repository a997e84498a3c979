// noFriction Meetings - Rewind Engine Library
// Synchronized timeline, media cache and capture-mode engine behind the rewind views

pub mod backend;
pub mod capture_mode;
pub mod config;
pub mod engine;
pub mod error;
pub mod media_cache;
pub mod meeting_trigger;
pub mod navigation;
pub mod normalizer;
pub mod scroll_sync;
pub mod timeline_index;

pub use backend::{CaptureBackend, HttpBackend, TimelineBackend};
pub use capture_mode::{
    AlwaysOnSettings, AutoEscalation, CaptureMode, CaptureModeController, CaptureProfile,
    CaptureSession,
};
pub use config::EngineConfig;
pub use engine::{ReloadOutcome, RewindEngine, TimelineHandle};
pub use error::{BackendError, EngineError, EngineResult};
pub use media_cache::{AssetState, AssetVariant, CacheStats, MediaCache};
pub use meeting_trigger::{ActivitySnapshot, MeetingDetection, MeetingDetector};
pub use navigation::{dispatch_key, Key, KeyCommand, NavMode, NavigationController, NavigationIntent};
pub use normalizer::{normalize, normalize_timeline, RawRecord, RawTimeline};
pub use scroll_sync::{LaneMetrics, PropagationState, ScrollSync, ScrollUpdate};
pub use timeline_index::{EventKey, Moment, Stream, TimelineEvent, TimelineIndex};

/// Initialise env_logger (RUST_LOG, default `info`). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
