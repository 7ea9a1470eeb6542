//! Keyed async mutexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes work per key (ticket id, user id).
///
/// Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard for a keyed lock. Releases on drop.
pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Keep only entries someone else still references.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        KeyedGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock key for a user's find-or-create path.
pub fn user_key(user_id: i64) -> String {
    format!("user:{}", user_id)
}
