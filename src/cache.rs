//! Bounded LRU cache of decoded source cells.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{CellKey, DemCell};
use crate::source::ElevationSource;

/// Default number of cells kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

type LoadResult = Result<Arc<DemCell>, SourceError>;
type Slot = Arc<OnceLock<LoadResult>>;

struct Entry {
    slot: Slot,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CellKey, Entry>,
    tick: u64,
}

/// Counters describing cache activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loads: u64,
    pub hits: u64,
    pub evictions: u64,
}

/// Cache of [`DemCell`]s keyed by 1°×1° cell, shared by all tile workers.
///
/// Concurrent misses for the same cell trigger a single load; the other
/// callers wait for that load. The bookkeeping lock is never held during I/O.
/// A cell without a file is remembered as [`SourceError::NotFound`] and probed
/// once until it is evicted. Read errors and timeouts are not kept; the next
/// `get` loads the cell again. Cells still loading are never evicted, so the
/// cache may briefly hold more than `capacity` entries.
pub struct DemFileCache {
    source: Arc<dyn ElevationSource>,
    capacity: usize,
    read_timeout: Option<Duration>,
    state: Mutex<CacheState>,
    loads: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl DemFileCache {
    pub fn new(source: Arc<dyn ElevationSource>, capacity: usize) -> Self {
        Self {
            source,
            capacity: capacity.max(1),
            read_timeout: None,
            state: Mutex::new(CacheState::default()),
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Abandon loads that take longer than `timeout`; they fail with
    /// [`SourceError::Timeout`].
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn get(&self, key: CellKey) -> Result<Arc<DemCell>, SourceError> {
        let slot = {
            let mut state = self.lock();
            state.tick += 1;
            let tick = state.tick;

            if let Some(entry) = state.entries.get_mut(&key) {
                entry.last_used = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&entry.slot)
            } else {
                if state.entries.len() >= self.capacity {
                    self.evict_oldest(&mut state);
                }
                let slot: Slot = Arc::new(OnceLock::new());
                state.entries.insert(
                    key,
                    Entry {
                        slot: Arc::clone(&slot),
                        last_used: tick,
                    },
                );
                slot
            }
        };

        let result = slot.get_or_init(|| self.load(key)).clone();

        // 読み込み失敗とタイムアウトは記憶せず、次の get で読み直す
        if matches!(
            result,
            Err(SourceError::Read { .. }) | Err(SourceError::Timeout { .. })
        ) {
            let mut state = self.lock();
            if state
                .entries
                .get(&key)
                .is_some_and(|entry| Arc::ptr_eq(&entry.slot, &slot))
            {
                state.entries.remove(&key);
            }
        }

        result
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.lock().entries.contains_key(&key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loads: self.loads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // 更新途中でパニックすることはないので、ポイズンされても状態は一貫している
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_oldest(&self, state: &mut CacheState) {
        let oldest = state
            .entries
            .iter()
            // 読み込み中のセルは追い出さない（一時的に容量を超えてもよい）
            .filter(|(_, entry)| entry.slot.get().is_some())
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);

        if let Some(key) = oldest {
            state.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Evicted cell {}", key);
        }
    }

    fn load(&self, key: CellKey) -> LoadResult {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let result = match self.read_timeout {
            None => self.source.load(key),
            Some(timeout) => self.load_with_timeout(key, timeout),
        };

        match &result {
            Ok(cell) => debug!("Loaded cell {} ({}x{})", key, cell.nrows, cell.ncols),
            Err(SourceError::NotFound(_)) => debug!("No data for cell {}", key),
            Err(e) => warn!("{}", e),
        }

        result.map(Arc::new)
    }

    fn load_with_timeout(&self, key: CellKey, timeout: Duration) -> Result<DemCell, SourceError> {
        let (tx, rx) = mpsc::channel();
        let source = Arc::clone(&self.source);

        thread::Builder::new()
            .name(format!("dem-load-{}-{}", key.row, key.col))
            .spawn(move || {
                // 受信側がタイムアウトで破棄されていても構わない
                let _ = tx.send(source.load(key));
            })
            .map_err(|e| SourceError::Read {
                key,
                reason: format!("failed to spawn loader: {}", e),
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SourceError::Timeout { key, timeout }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SourceError::Read {
                key,
                reason: "loader exited without a result".to_string(),
            }),
        }
    }
}
