// noFriction Meetings - Rewind Engine Configuration
// Loads engine tunables from .env files and the process environment
//
// Lookup order:
// 1. .env in the working directory
// 2. ~/.nofriction-meetings/.env
// 3. process environment (REWIND_* variables)

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the recording/storage backend
    pub backend_url: Option<String>,
    /// Bearer token for the backend
    pub backend_token: Option<String>,
    /// Byte budget for the shared media cache
    pub cache_budget_bytes: u64,
    /// How long a failed asset fetch is remembered before it may be retried
    pub failure_cooldown: Duration,
    /// Maximum concurrent prefetch (gallery) fetches
    pub prefetch_concurrency: usize,
    /// Re-poll interval for timelines of meetings still recording
    pub live_poll_interval: Duration,
    /// Re-poll interval for the backend capture mode
    pub mode_poll_interval: Duration,
    /// Max distance for "what was being said" lookups outside any interval
    pub transcript_tolerance_ms: u64,
    /// Gallery cursor movement for Up/Down
    pub gallery_row_stride: usize,
    /// Gallery cursor movement for PageUp/PageDown
    pub gallery_page_stride: usize,
    /// Number of thumbnails rendered around the cursor
    pub gallery_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            backend_token: None,
            cache_budget_bytes: 64 * 1024 * 1024, // 64 MiB
            failure_cooldown: Duration::from_secs(10),
            prefetch_concurrency: 4,
            live_poll_interval: Duration::from_secs(3),
            mode_poll_interval: Duration::from_secs(15),
            transcript_tolerance_ms: 2_000,
            gallery_row_stride: 6,
            gallery_page_stride: 24,
            gallery_window: 48,
        }
    }
}

impl EngineConfig {
    /// Load configuration from .env files and the environment
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".nofriction-meetings").join(".env");
            if home_env.exists() {
                let _ = dotenvy::from_path(home_env);
            }
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read a single .env file without touching the process environment
    pub fn from_env_file(path: &Path) -> Result<Self, dotenvy::Error> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Ok(Self::from_lookup(|key| vars.get(key).cloned()))
    }

    /// Build a config from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let parsed = |key: &str| -> Option<u64> { parse_var(&lookup, key) };

        Self {
            backend_url: text("REWIND_BACKEND_URL"),
            backend_token: text("REWIND_BACKEND_TOKEN"),
            cache_budget_bytes: parsed("REWIND_CACHE_BUDGET_MB")
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.cache_budget_bytes),
            failure_cooldown: parsed("REWIND_FAILURE_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.failure_cooldown),
            prefetch_concurrency: parse_var(&lookup, "REWIND_PREFETCH_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.prefetch_concurrency),
            live_poll_interval: parsed("REWIND_LIVE_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.live_poll_interval),
            mode_poll_interval: parsed("REWIND_MODE_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mode_poll_interval),
            transcript_tolerance_ms: parsed("REWIND_TRANSCRIPT_TOLERANCE_MS")
                .unwrap_or(defaults.transcript_tolerance_ms),
            gallery_row_stride: parse_var(&lookup, "REWIND_GALLERY_ROW_STRIDE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.gallery_row_stride),
            gallery_page_stride: parse_var(&lookup, "REWIND_GALLERY_PAGE_STRIDE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.gallery_page_stride),
            gallery_window: parse_var(&lookup, "REWIND_GALLERY_WINDOW")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.gallery_window),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}
