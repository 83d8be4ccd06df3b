//! In-process single-flight locking keyed by content id.
//!
//! Concurrent pipeline runs for the same id serialize on one async mutex;
//! the run that waited re-checks the result cache before doing any work.
//! Lock entries are held weakly and disappear once no run references them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

type KeyLock = tokio::sync::Mutex<()>;

/// Per-key async locks.
#[derive(Debug, Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, Weak<KeyLock>>>,
}

/// Held while a run owns its key; dropping it lets the next waiter in.
#[derive(Debug)]
pub struct SingleFlightGuard {
    waited: bool,
    _guard: OwnedMutexGuard<()>,
}

impl SingleFlightGuard {
    /// Whether another run held the key when this one arrived.
    pub fn waited(&self) -> bool {
        self.waited
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<KeyLock> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(KeyLock::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Wait until no other run holds `key`, then hold it.
    pub async fn acquire(&self, key: &str) -> SingleFlightGuard {
        let lock = self.lock_for(key);

        let (guard, waited) = match lock.clone().try_lock_owned() {
            Ok(guard) => (guard, false),
            Err(_) => {
                debug!(key, "Run in flight for key, waiting");
                (lock.lock_owned().await, true)
            }
        };

        SingleFlightGuard {
            waited,
            _guard: guard,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
