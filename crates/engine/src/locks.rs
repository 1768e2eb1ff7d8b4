// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed read/write locks
//!
//! One `tokio::sync::RwLock` per key, created on demand and held weakly by
//! the map so unused keys are reclaimed. Unrelated keys never contend.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Dead entries are swept once the map grows past this many keys
const SWEEP_THRESHOLD: usize = 64;

pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Weak<RwLock<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn handle(&self, key: &K) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        if locks.len() >= SWEEP_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }
        let lock = Arc::new(RwLock::new(()));
        locks.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }

    pub async fn exclusive(&self, key: &K) -> OwnedRwLockWriteGuard<()> {
        self.handle(key).write_owned().await
    }

    pub async fn shared(&self, key: &K) -> OwnedRwLockReadGuard<()> {
        self.handle(key).read_owned().await
    }

    /// Exclusive access, or `None` if the lock stays held past `timeout`
    pub async fn exclusive_timeout(
        &self,
        key: &K,
        timeout: Duration,
    ) -> Option<OwnedRwLockWriteGuard<()>> {
        tokio::time::timeout(timeout, self.handle(key).write_owned())
            .await
            .ok()
    }

    /// Number of keys with a live lock
    pub fn live(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
