//! Per-key single-flight memoization
//!
//! Each key owns one `OnceCell`. The first caller for a key runs the loader on
//! the blocking pool; concurrent callers for the same key wait on that cell
//! instead of loading again, while callers for other keys never touch it.
//!
//! ```text
//! caller A ─┐                      ┌─► cell["09"] ── loader (runs once)
//! caller B ─┼──► SingleFlight ─────┤
//! caller C ─┘                      └─► cell["19"] ── loader (runs in parallel)
//! ```
//!
//! The load runs inside a spawned task, so a caller that gives up waiting
//! does not cancel it: the value still lands in the cell for later callers.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::OnceCell;

/// The loader never produced a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Loader task failed: {0}")]
pub struct LoadAborted(pub String);

/// Map from key to a lazily computed, shared-once value
pub struct SingleFlight<K, V> {
    cells: DashMap<K, Arc<OnceCell<V>>>,
    loads: Arc<AtomicU64>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            loads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Value for `key` if it has finished loading
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Return the value for `key`, running `load` only if no value exists and
    /// no other load for the same key is in flight.
    pub async fn get_or_load<F>(&self, key: K, load: F) -> Result<V, LoadAborted>
    where
        F: FnOnce() -> V + Send + 'static,
    {
        let cell = Arc::clone(&*self.cells.entry(key).or_default());
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }

        let loads = Arc::clone(&self.loads);
        let task = tokio::spawn(async move {
            cell.get_or_try_init(|| async move {
                loads.fetch_add(1, Ordering::Relaxed);
                tokio::task::spawn_blocking(load)
                    .await
                    .map_err(|e| LoadAborted(e.to_string()))
            })
            .await
            .cloned()
        });

        task.await.map_err(|e| LoadAborted(e.to_string()))?
    }

    /// Number of keys holding a finished value
    pub fn loaded_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Number of loader invocations so far
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
