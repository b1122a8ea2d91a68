//! Per-name async mutual exclusion.
//!
//! Mutations of one DID, one alias or one key id are serialized through a
//! lock keyed by that name; unrelated names never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of named async locks, created on demand.
#[derive(Default)]
pub struct KeyedLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards held for a set of names. Released on drop.
pub struct KeyedGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one name.
    pub async fn lock(&self, name: &str) -> KeyedGuard {
        self.lock_many([name.to_string()]).await
    }

    /// Acquire the locks for several names.
    ///
    /// Names are taken in sorted order so two callers locking overlapping
    /// sets cannot deadlock.
    pub async fn lock_many<I>(&self, names: I) -> KeyedGuard
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = names.iter().map(|n| self.entry(n)).collect();
        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        KeyedGuard { _guards: guards }
    }

    /// Number of names currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Return `true` if no names are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Drop idle entries: only the map itself holds them.
        entries.retain(|_, m| Arc::strong_count(m) > 1);
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
