//! Single-value cache with a time-to-live.

use chimera_core::{Clock, Timestamp};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    cached_at: Timestamp,
}

#[derive(Debug)]
struct Slot<V> {
    entry: Option<Entry<V>>,
    /// Bumped by every invalidation.
    generation: u64,
}

/// Holds one value for at most `ttl`, measured against an injected clock.
///
/// Loaders that read the backing store outside the lock take
/// [`generation`](Self::generation) first and store with
/// [`set_if_current`](Self::set_if_current), so a value read before an
/// invalidation is never cached after it.
#[derive(Debug)]
pub struct TtlCache<V> {
    slot: Mutex<Slot<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(Slot {
                entry: None,
                generation: 0,
            }),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached value if it is younger than the TTL.
    pub fn get(&self) -> Option<V> {
        let now = self.clock.now();
        let slot = self.lock();
        let entry = slot.entry.as_ref()?;
        let age = (now - entry.cached_at).to_std().unwrap_or(Duration::ZERO);
        (age < self.ttl).then(|| entry.value.clone())
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Store `value` only if no invalidation happened since `generation` was
    /// read. Returns whether the value was stored.
    pub fn set_if_current(&self, value: V, generation: u64) -> bool {
        let cached_at = self.clock.now();
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.entry = Some(Entry { value, cached_at });
        true
    }

    /// Drop the cached value immediately.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}
