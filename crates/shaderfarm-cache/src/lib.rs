//! Shaderfarm Cache Store
//!
//! Durable key→bytes map for compiled shader output. The store favors
//! availability over strict durability: a corrupt cache file is recovered
//! from the backup chain, and in the worst case the server starts with an
//! empty cache rather than refusing to come up.
//!
//! Concurrency discipline: many job threads read and insert while a single
//! scheduled writer (the housekeeping loop) persists pending entries.

pub mod codec;
pub mod recovery;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub use recovery::LoadOutcome;

/// Active cache file name.
pub const CACHE_FILE: &str = "Cache.dat";
/// Previous good copy.
pub const BACKUP_FILE: &str = "Cache.bak";
/// Previous-previous good copy.
pub const BACKUP2_FILE: &str = "Cache.bak2";

/// Errors for cache persistence. Load-time corruption is handled internally
/// by recovery and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache data is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Persistent map from canonical request keys to compiled output bytes.
pub struct CacheStore {
    dir: PathBuf,
    entries: RwLock<HashMap<String, Vec<u8>>>,
    /// Inserts since the last flush. Only the scheduled writer resets it.
    pending_inserts: AtomicUsize,
    ready: AtomicBool,
}

impl CacheStore {
    /// Create a store rooted at `dir`. No I/O happens until [`load`].
    ///
    /// [`load`]: CacheStore::load
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(HashMap::new()),
            pending_inserts: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Canonical cache key for a compile request: hex SHA-256 of its bytes.
    pub fn entry_key(request_bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request_bytes);
        hex::encode(hasher.finalize())
    }

    /// Load the cache from disk, recovering from the backup chain if the
    /// active file is corrupt. Never fails: the worst outcome is an empty
    /// store, which is logged.
    pub fn load(&self) -> LoadOutcome {
        let (outcome, loaded) = recovery::load_with_recovery(&self.dir);
        let count = loaded.len();
        {
            let mut entries = self.entries.write().expect("cache lock poisoned");
            *entries = loaded;
        }
        info!(entries = count, outcome = ?outcome, "cache store loaded");
        outcome
    }

    /// Mark the store ready for lookups. Called once after load/recovery,
    /// before lookups are expected to hit.
    pub fn finalize(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Look up a compiled result. Misses until [`finalize`] has run, so a
    /// lookup racing the initial load behaves as "not yet cached".
    ///
    /// [`finalize`]: CacheStore::finalize
    pub fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Insert a freshly compiled result. Visible to readers immediately;
    /// persisted by the next scheduled flush.
    pub fn insert(&self, key: String, value: Vec<u8>) {
        {
            let mut entries = self.entries.write().expect("cache lock poisoned");
            entries.insert(key, value);
        }
        self.pending_inserts.fetch_add(1, Ordering::AcqRel);
    }

    /// Flush entries accumulated since the last flush. Invoked by the
    /// housekeeping loop; returns whether anything was written.
    pub fn save_pending(&self) -> CacheResult<bool> {
        if self.pending_inserts.swap(0, Ordering::AcqRel) == 0 {
            return Ok(false);
        }
        let snapshot = self.entries.read().expect("cache lock poisoned").clone();
        let encoded = codec::encode(&snapshot);
        write_atomic(&self.dir.join(CACHE_FILE), &encoded)?;
        debug!(entries = snapshot.len(), "flushed pending cache entries");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Write-then-rename so a crash mid-flush never corrupts the active file.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp = path.with_extension("tmp");
    fs::write(&temp, data)?;
    fs::rename(&temp, path)
}
