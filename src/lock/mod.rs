//! Per-key mutual exclusion.
//!
//! [`KeyedLock`] is the waiting policy: callers for a busy key join the
//! running computation and share its result. [`InFlightSet`] is the fast-fail
//! policy: a caller for a busy key is turned away immediately.

use crate::error::LockError;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type SharedRun<T> = Shared<BoxFuture<'static, Result<T, LockError>>>;

struct Slot<T: Clone> {
    generation: u64,
    run: SharedRun<T>,
}

/// Single-flight execution keyed by string.
///
/// At most one computation per key runs at a time; concurrent callers await
/// that computation and receive a clone of its result. A computation that
/// outlives `max_hold` is dropped, which cancels whatever it was awaiting,
/// and every waiter receives [`LockError::Expired`].
pub struct KeyedLock<T: Clone> {
    name: &'static str,
    max_hold: Duration,
    inflight: DashMap<String, Slot<T>>,
    generation: AtomicU64,
}

impl<T> KeyedLock<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_hold: Duration) -> Self {
        Self {
            name,
            max_hold,
            inflight: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    pub async fn with_lock<F, Fut>(&self, key: &str, compute: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (generation, run) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                debug!(lock = self.name, key, "joining in-flight computation");
                let slot = slot.get();
                (slot.generation, slot.run.clone())
            }
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let run = self.guarded(key, compute());
                vacant.insert(Slot {
                    generation,
                    run: run.clone(),
                });
                (generation, run)
            }
        };

        let result = run.await;
        self.inflight
            .remove_if(key, |_, slot| slot.generation == generation);
        result
    }

    fn guarded<Fut>(&self, key: &str, compute: Fut) -> SharedRun<T>
    where
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let name = self.name;
        let key = key.to_string();
        let max_hold = self.max_hold;

        async move {
            match tokio::time::timeout(max_hold, compute).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(LockError::Failed(format!("{:#}", e))),
                Err(_) => {
                    warn!(lock = name, key = %key, "⏰ lock expired after {:?}, computation cancelled", max_hold);
                    Err(LockError::Expired { key, held: max_hold })
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Keys currently being worked on; see [`InFlightSet::try_acquire`].
#[derive(Debug, Default, Clone)]
pub struct InFlightSet {
    keys: Arc<DashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` busy, or returns `None` when it already is. The mark is
    /// cleared when the guard drops, including on cancellation.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        if !self.keys.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

pub struct InFlightGuard {
    keys: Arc<DashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}
