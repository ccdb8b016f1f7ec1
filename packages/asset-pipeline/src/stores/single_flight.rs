//! Per-fingerprint serialization of expensive work.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::fingerprint::Fingerprint;

/// Async lock table keyed by fingerprint.
///
/// The first caller for a key gets the lock at once; concurrent callers for
/// the same key wait until it is released, then re-check the cache before
/// doing the work themselves. Keys nobody holds or waits on are pruned.
#[derive(Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

/// Held while the owner computes the value for a key.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`.
    pub async fn acquire(&self, key: &Fingerprint) -> FlightGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        FlightGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Keys currently held or awaited.
    pub async fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
