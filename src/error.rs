// noFriction Meetings - Rewind Errors
// Error taxonomy shared by the timeline, cache and capture-mode components

use crate::capture_mode::CaptureMode;

/// Errors surfaced to views.
///
/// `NotFound` and `Stale` are not failures from the user's point of view: the first
/// renders an empty state, the second is dropped by the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Empty stream, missing asset or unknown meeting
    #[error("not found: {0}")]
    NotFound(String),

    /// The handle no longer refers to the active meeting
    #[error("stale timeline handle for meeting {meeting_id}")]
    Stale { meeting_id: String },

    /// Network/backend error while fetching an asset; cached for a short cool-down
    #[error("fetch failed for {asset}: {reason}")]
    FetchFailed { asset: String, reason: String },

    /// Mode change refused; `current` is the mode still in effect
    #[error("transition to {requested:?} rejected ({reason}); capture remains {current:?}")]
    TransitionRejected {
        requested: CaptureMode,
        current: CaptureMode,
        reason: String,
    },

    /// Any other backend failure (settings, polling)
    #[error("backend error: {0}")]
    Backend(String),
}

impl EngineError {
    /// Errors that views should render as an empty state or ignore entirely.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Stale { .. })
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => Self::NotFound(what),
            other => Self::Backend(other.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by a backend implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("backend not configured: {0} is not set")]
    NotConfigured(&'static str),
}

impl From<base64::DecodeError> for BackendError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
