// noFriction Meetings - Media Cache
// Shared, byte-budgeted cache of thumbnail and full-resolution frame images
//
// Features:
// - Request coalescing: concurrent callers for the same asset share one fetch
// - Failure cool-down: failed fetches are remembered briefly to avoid hot retry loops
// - LRU eviction under a byte budget, never evicting a pinned (displayed) asset
// - Low-priority prefetch lane so gallery fills never starve user selections

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::backend::TimelineBackend;
use crate::config::EngineConfig;
use crate::error::{BackendError, EngineError, EngineResult};

/// Rendering of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetVariant {
    Thumbnail,
    Full,
}

impl AssetVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub asset_id: String,
    pub variant: AssetVariant,
}

impl AssetKey {
    pub fn new(asset_id: &str, variant: AssetVariant) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            variant,
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_id, self.variant.as_str())
    }
}

pub type AssetBytes = Arc<Vec<u8>>;

type PendingFetch = Shared<BoxFuture<'static, EngineResult<AssetBytes>>>;

/// Where an asset stands from a view's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum AssetState {
    NotRequested,
    Pending,
    Ready { size_bytes: u64 },
    Failed { reason: String, retry_in: Duration },
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub budget_bytes: u64,
    pub pending: usize,
    pub failures: usize,
    pub pinned: usize,
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub evictions: u64,
}

struct CacheEntry {
    data: AssetBytes,
    size_bytes: u64,
    /// Logical access clock; larger is more recent
    last_accessed: u64,
}

struct FailedFetch {
    reason: String,
    missing: bool,
    failed_at: Instant,
}

struct InFlight {
    ticket: u64,
    fetch: PendingFetch,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<AssetKey, CacheEntry>,
    in_flight: HashMap<AssetKey, InFlight>,
    failures: HashMap<AssetKey, FailedFetch>,
    pins: HashMap<u64, AssetKey>,
    total_bytes: u64,
    clock: u64,
    next_ticket: u64,
    hits: u64,
    misses: u64,
    fetches: u64,
    evictions: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &AssetKey) -> Option<AssetBytes> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.data.clone())
    }

    fn insert(&mut self, key: AssetKey, data: AssetBytes) {
        let size_bytes = data.len() as u64;
        let last_accessed = self.tick();
        if let Some(old) = self.entries.insert(
            key,
            CacheEntry {
                data,
                size_bytes,
                last_accessed,
            },
        ) {
            self.total_bytes -= old.size_bytes;
        }
        self.total_bytes += size_bytes;
    }

    /// Drop least-recently-accessed unpinned entries until the budget holds
    fn evict_to(&mut self, budget_bytes: u64) -> usize {
        if self.total_bytes <= budget_bytes {
            return 0;
        }

        let mut candidates: Vec<(u64, AssetKey)> = {
            let pinned: HashSet<&AssetKey> = self.pins.values().collect();
            self.entries
                .iter()
                .filter(|(key, _)| !pinned.contains(key))
                .map(|(key, entry)| (entry.last_accessed, key.clone()))
                .collect()
        };
        candidates.sort_unstable_by_key(|(accessed, _)| *accessed);

        let mut evicted = 0;
        for (_, key) in candidates {
            if self.total_bytes <= budget_bytes {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes -= entry.size_bytes;
                evicted += 1;
            }
        }
        self.evictions += evicted as u64;

        if self.total_bytes > budget_bytes {
            log::warn!(
                "🗑️ Pinned assets alone ({} bytes) exceed the cache budget ({} bytes)",
                self.total_bytes,
                budget_bytes
            );
        }

        evicted
    }
}

enum Lookup {
    Ready(AssetBytes),
    Pending(PendingFetch),
}

/// Media cache shared by every open rewind view
#[derive(Clone)]
pub struct MediaCache {
    backend: Arc<dyn TimelineBackend>,
    state: Arc<Mutex<CacheState>>,
    budget_bytes: u64,
    failure_cooldown: Duration,
    prefetch_permits: Arc<Semaphore>,
}

impl MediaCache {
    pub fn new(
        backend: Arc<dyn TimelineBackend>,
        budget_bytes: u64,
        failure_cooldown: Duration,
        prefetch_concurrency: usize,
    ) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(CacheState::default())),
            budget_bytes,
            failure_cooldown,
            prefetch_permits: Arc::new(Semaphore::new(prefetch_concurrency.max(1))),
        }
    }

    pub fn from_config(backend: Arc<dyn TimelineBackend>, config: &EngineConfig) -> Self {
        Self::new(
            backend,
            config.cache_budget_bytes,
            config.failure_cooldown,
            config.prefetch_concurrency,
        )
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Cached bytes, if present. Never fetches.
    pub fn get_cached(&self, asset_id: &str, variant: AssetVariant) -> Option<AssetBytes> {
        let key = AssetKey::new(asset_id, variant);
        let mut state = self.state.lock();
        let data = state.touch(&key);
        if data.is_some() {
            state.hits += 1;
        }
        data
    }

    /// Cached bytes, or the result of the single shared fetch for this asset.
    ///
    /// Must be called from within a tokio runtime; the fetch itself runs as a spawned
    /// task so it completes (and populates the cache) even if every caller goes away.
    pub async fn get(&self, asset_id: &str, variant: AssetVariant) -> EngineResult<AssetBytes> {
        let key = AssetKey::new(asset_id, variant);
        match self.lookup_or_start(&key)? {
            Lookup::Ready(data) => Ok(data),
            Lookup::Pending(fetch) => fetch.await,
        }
    }

    fn lookup_or_start(&self, key: &AssetKey) -> EngineResult<Lookup> {
        let mut state = self.state.lock();

        if let Some(data) = state.touch(key) {
            state.hits += 1;
            return Ok(Lookup::Ready(data));
        }

        if let Some(failed) = state.failures.get(key) {
            if failed.failed_at.elapsed() < self.failure_cooldown {
                return Err(failure_error(key, failed));
            }
            state.failures.remove(key);
        }

        if let Some(in_flight) = state.in_flight.get(key) {
            return Ok(Lookup::Pending(in_flight.fetch.clone()));
        }

        state.misses += 1;
        state.fetches += 1;
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let fetch = self.spawn_fetch(key.clone(), ticket);
        state.in_flight.insert(
            key.clone(),
            InFlight {
                ticket,
                fetch: fetch.clone(),
            },
        );
        Ok(Lookup::Pending(fetch))
    }

    fn spawn_fetch(&self, key: AssetKey, ticket: u64) -> PendingFetch {
        let backend = self.backend.clone();
        let state = self.state.clone();
        let budget = self.budget_bytes;
        let label = key.to_string();

        log::debug!("🖼️ Fetching {}", label);

        let task = tokio::spawn(async move {
            let result = backend.fetch_asset(&key.asset_id, key.variant).await;
            complete_fetch(&state, key, ticket, result, budget)
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::FetchFailed {
                    asset: label,
                    reason: format!("fetch task aborted: {}", e),
                }),
            }
        }
        .boxed()
        .shared()
    }

    /// Schedule background fetches for a batch of assets without waiting for them.
    ///
    /// Prefetches share a small concurrency limit; `get` calls bypass it. Each queued
    /// fetch re-checks `is_relevant` before starting and is dropped if its view moved on.
    /// Returns the number of fetches scheduled.
    pub fn prefetch_window<I, F>(&self, asset_ids: I, variant: AssetVariant, is_relevant: F) -> usize
    where
        I: IntoIterator<Item = String>,
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let is_relevant = Arc::new(is_relevant);
        let mut scheduled = 0;

        for asset_id in asset_ids {
            if self.state(&asset_id, variant) != AssetState::NotRequested {
                continue;
            }

            let cache = self.clone();
            let permits = self.prefetch_permits.clone();
            let is_relevant = is_relevant.clone();

            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if !is_relevant() {
                    log::debug!("Dropping prefetch for {} (view moved on)", asset_id);
                    return;
                }
                if let Err(e) = cache.get(&asset_id, variant).await {
                    log::debug!("Prefetch of {} failed: {}", asset_id, e);
                }
            });
            scheduled += 1;
        }

        if scheduled > 0 {
            log::debug!("🖼️ Prefetching {} {} assets", scheduled, variant.as_str());
        }
        scheduled
    }

    /// Evict least-recently-accessed entries until total bytes fit `budget_bytes`.
    /// Pinned entries are never evicted. Returns the number of evicted entries.
    pub fn evict(&self, budget_bytes: u64) -> usize {
        self.state.lock().evict_to(budget_bytes)
    }

    /// Mark `asset` as displayed by `owner`, replacing that owner's previous pin
    pub fn pin(&self, owner: u64, asset_id: &str, variant: AssetVariant) {
        self.state
            .lock()
            .pins
            .insert(owner, AssetKey::new(asset_id, variant));
    }

    pub fn unpin(&self, owner: u64) {
        let mut state = self.state.lock();
        state.pins.remove(&owner);
        state.evict_to(self.budget_bytes);
    }

    /// Forget a cached failure so the next `get` fetches again
    pub fn retry(&self, asset_id: &str, variant: AssetVariant) -> bool {
        self.state
            .lock()
            .failures
            .remove(&AssetKey::new(asset_id, variant))
            .is_some()
    }

    pub fn state(&self, asset_id: &str, variant: AssetVariant) -> AssetState {
        let key = AssetKey::new(asset_id, variant);
        let state = self.state.lock();

        if let Some(entry) = state.entries.get(&key) {
            return AssetState::Ready {
                size_bytes: entry.size_bytes,
            };
        }
        if state.in_flight.contains_key(&key) {
            return AssetState::Pending;
        }
        let Some(failed) = state.failures.get(&key) else {
            return AssetState::NotRequested;
        };
        match self
            .failure_cooldown
            .checked_sub(failed.failed_at.elapsed())
        {
            Some(retry_in) if !retry_in.is_zero() => AssetState::Failed {
                reason: failed.reason.clone(),
                retry_in,
            },
            _ => AssetState::NotRequested,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            budget_bytes: self.budget_bytes,
            pending: state.in_flight.len(),
            failures: state.failures.len(),
            pinned: state.pins.len(),
            hits: state.hits,
            misses: state.misses,
            fetches: state.fetches,
            evictions: state.evictions,
        }
    }
}

fn failure_error(key: &AssetKey, failed: &FailedFetch) -> EngineError {
    if failed.missing {
        EngineError::NotFound(key.to_string())
    } else {
        EngineError::FetchFailed {
            asset: key.to_string(),
            reason: failed.reason.clone(),
        }
    }
}

/// Record the outcome of a fetch. Runs exactly once per fetch, inside the spawned task.
fn complete_fetch(
    state: &Mutex<CacheState>,
    key: AssetKey,
    ticket: u64,
    result: Result<Vec<u8>, BackendError>,
    budget_bytes: u64,
) -> EngineResult<AssetBytes> {
    let mut state = state.lock();

    let current = state.in_flight.get(&key).map(|f| f.ticket) == Some(ticket);
    if current {
        state.in_flight.remove(&key);
    }

    match result {
        Ok(bytes) => {
            let data = Arc::new(bytes);
            if current {
                state.insert(key, data.clone());
                state.evict_to(budget_bytes);
            }
            Ok(data)
        }
        Err(err) => {
            let failed = FailedFetch {
                missing: matches!(err, BackendError::NotFound(_)),
                reason: err.to_string(),
                failed_at: Instant::now(),
            };
            log::warn!("⚠️ Asset fetch failed for {}: {}", key, failed.reason);
            let error = failure_error(&key, &failed);
            if current {
                state.failures.insert(key, failed);
            }
            Err(error)
        }
    }
}
