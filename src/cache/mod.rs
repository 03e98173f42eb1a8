//! Single-flight render cache
//!
//! Maps a canonical request key to rendered bytes with a time-to-live. The
//! same map doubles as the single-flight barrier: the first request to miss
//! a key installs a `Pending` slot and becomes its filler, and every later
//! request for that key waits for the filler instead of rendering again.
//!
//! A filler that gives up (error, timeout, rate limit, panic, or a dropped
//! request future) removes its `Pending` slot when its [`FillGuard`] is
//! dropped. Waiters then look the key up again and one of them takes over.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

pub mod entry;
pub mod key;

pub use entry::Payload;
pub use key::{CacheKey, CacheKeyMatcher};

use entry::Slot;

/// Result of a non-blocking lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Payload),
    Miss,
    InProgress,
}

/// Result of [`RenderCache::acquire`]
#[derive(Debug)]
pub enum Acquired {
    /// A finished render, served as is
    Hit(Payload),
    /// The caller owns the fill and must complete or drop the guard
    Fill(FillGuard),
}

/// Counters reported on the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub abandoned: u64,
}

#[derive(Debug)]
struct CacheInner {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    next_fill_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    abandoned: AtomicU64,
}

enum Claim {
    Hit(Payload),
    Wait(watch::Receiver<()>),
    Fill(FillGuard),
}

/// TTL cache of rendered responses. Cloning shares the same store.
#[derive(Debug, Clone)]
pub struct RenderCache {
    inner: Arc<CacheInner>,
}

impl RenderCache {
    /// A zero `ttl` keeps entries until the next [`reset`](Self::reset).
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                slots: Mutex::new(HashMap::new()),
                next_fill_id: AtomicU64::new(1),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                abandoned: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Inspect a key without waiting or claiming it
    pub fn lookup(&self, key: &str) -> Lookup {
        let now = Instant::now();
        let mut slots = self.inner.lock();
        let expired = match slots.get(key) {
            Some(Slot::Ready {
                payload,
                created_at,
            }) => {
                if !self.inner.is_expired(*created_at, now) {
                    return Lookup::Hit(payload.clone());
                }
                true
            }
            Some(Slot::Pending { .. }) => return Lookup::InProgress,
            None => false,
        };
        if expired {
            slots.remove(key);
        }
        Lookup::Miss
    }

    /// Claim a missing key for filling.
    ///
    /// Returns `None` when the key already holds a fresh render or another
    /// caller is filling it.
    pub fn begin_fill(&self, key: &str) -> Option<FillGuard> {
        match self.claim(key) {
            Claim::Fill(guard) => Some(guard),
            Claim::Hit(_) | Claim::Wait(_) => None,
        }
    }

    /// Store a finished render and wake every waiter
    pub fn complete_fill(&self, guard: FillGuard, payload: Payload) {
        guard.complete(payload);
    }

    /// Return the cached render for `key`, waiting out any fill in
    /// progress, or hand the caller the fill.
    pub async fn acquire(&self, key: &str) -> Acquired {
        loop {
            match self.claim(key) {
                Claim::Hit(payload) => return Acquired::Hit(payload),
                Claim::Fill(guard) => return Acquired::Fill(guard),
                Claim::Wait(mut done) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Waiting for in-flight render");
                    // Resolves once the filler stores its result or gives up.
                    let _ = done.changed().await;
                }
            }
        }
    }

    fn claim(&self, key: &str) -> Claim {
        let now = Instant::now();
        let mut slots = self.inner.lock();

        match slots.get(key) {
            Some(Slot::Ready {
                payload,
                created_at,
            }) if !self.inner.is_expired(*created_at, now) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Claim::Hit(payload.clone());
            }
            Some(Slot::Pending { done, .. }) => return Claim::Wait(done.clone()),
            Some(Slot::Ready { .. }) | None => {}
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let fill_id = self.inner.next_fill_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(());
        slots.insert(
            key.to_string(),
            Slot::Pending {
                fill_id,
                done: rx,
            },
        );

        Claim::Fill(FillGuard {
            inner: self.inner.clone(),
            key: key.to_string(),
            fill_id,
            completed: false,
            _done: tx,
        })
    }

    /// Drop finished renders older than the TTL. Pending fills are kept.
    pub fn evict_expired(&self) -> usize {
        if self.inner.ttl.is_zero() {
            return 0;
        }
        let now = Instant::now();
        let mut slots = self.inner.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { created_at, .. } => !self.inner.is_expired(*created_at, now),
            Slot::Pending { .. } => true,
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, remaining = slots.len(), "Evicted expired renders");
        }
        evicted
    }

    /// Clear every finished render.
    ///
    /// Fills in progress survive so their waiters are not stranded and a
    /// second render of the same key cannot start alongside them.
    pub fn reset(&self) -> usize {
        let mut slots = self.inner.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_pending());
        let cleared = before - slots.len();
        info!(cleared, "Render cache reset");
        cleared
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            abandoned: self.inner.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, created_at: Instant, now: Instant) -> bool {
        !self.ttl.is_zero() && now.saturating_duration_since(created_at) > self.ttl
    }

    fn owns(slots: &HashMap<String, Slot>, key: &str, fill_id: u64) -> bool {
        matches!(slots.get(key), Some(Slot::Pending { fill_id: id, .. }) if *id == fill_id)
    }

    fn store(&self, key: &str, fill_id: u64, payload: Payload) {
        let mut slots = self.lock();
        // A reset may have removed the slot; only a newer filler's slot is off limits.
        if Self::owns(&slots, key, fill_id) || !slots.contains_key(key) {
            slots.insert(
                key.to_string(),
                Slot::Ready {
                    payload,
                    created_at: Instant::now(),
                },
            );
        }
    }

    fn abandon(&self, key: &str, fill_id: u64) {
        let mut slots = self.lock();
        if Self::owns(&slots, key, fill_id) {
            slots.remove(key);
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Render fill abandoned");
        }
    }
}

/// Exclusive right to fill one cache key.
///
/// Call [`complete`](Self::complete) with the rendered payload. Dropping the
/// guard without completing removes the `Pending` slot. Either way the
/// waiters are woken after the map has been updated.
#[derive(Debug)]
pub struct FillGuard {
    inner: Arc<CacheInner>,
    key: String,
    fill_id: u64,
    completed: bool,
    // Dropped after `Drop::drop` runs, which is what wakes the waiters.
    _done: watch::Sender<()>,
}

impl FillGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn complete(mut self, payload: Payload) {
        self.inner.store(&self.key, self.fill_id, payload);
        self.completed = true;
    }
}

impl Drop for FillGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.inner.abandon(&self.key, self.fill_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn payload(body: &'static [u8]) -> Payload {
        Payload::new(Bytes::from_static(body), "image/png")
    }

    #[test]
    fn test_unseen_key_is_a_miss() {
        let cache = RenderCache::new(Duration::from_secs(60));
        assert_eq!(cache.lookup("/abc123"), Lookup::Miss);
    }

    #[test]
    fn test_fill_then_hit() {
        let cache = RenderCache::new(Duration::from_secs(60));
        let guard = cache.begin_fill("/abc123").unwrap();
        assert_eq!(cache.lookup("/abc123"), Lookup::InProgress);
        assert!(cache.begin_fill("/abc123").is_none());

        cache.complete_fill(guard, payload(b"rendered"));
        assert_eq!(cache.lookup("/abc123"), Lookup::Hit(payload(b"rendered")));
        assert!(cache.begin_fill("/abc123").is_none());
    }

    #[test]
    fn test_abandoned_fill_removes_pending_slot() {
        let cache = RenderCache::new(Duration::from_secs(60));
        let guard = cache.begin_fill("/abc123").unwrap();
        drop(guard);

        assert_eq!(cache.lookup("/abc123"), Lookup::Miss);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().abandoned, 1);
        assert!(cache.begin_fill("/abc123").is_some());
    }

    #[test]
    fn test_expired_entries_miss_and_evict() {
        let cache = RenderCache::new(Duration::from_millis(10));
        let guard = cache.begin_fill("/abc123").unwrap();
        guard.complete(payload(b"old"));
        let pending = cache.begin_fill("/def456").unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.lookup("/abc123"), Lookup::Miss);
        assert_eq!(cache.lookup("/def456"), Lookup::InProgress);
        drop(pending);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let cache = RenderCache::new(Duration::ZERO);
        cache.begin_fill("/abc123").unwrap().complete(payload(b"kept"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.evict_expired(), 0);
        assert_eq!(cache.lookup("/abc123"), Lookup::Hit(payload(b"kept")));
    }

    #[test]
    fn test_reset_keeps_pending_fills() {
        let cache = RenderCache::new(Duration::from_secs(60));
        cache.begin_fill("/abc123").unwrap().complete(payload(b"done"));
        let pending = cache.begin_fill("/def456").unwrap();

        assert_eq!(cache.reset(), 1);
        assert_eq!(cache.lookup("/abc123"), Lookup::Miss);
        assert_eq!(cache.lookup("/def456"), Lookup::InProgress);

        pending.complete(payload(b"late"));
        assert_eq!(cache.lookup("/def456"), Lookup::Hit(payload(b"late")));
    }

    #[tokio::test]
    async fn test_waiters_receive_completed_payload() {
        let cache = RenderCache::new(Duration::from_secs(60));
        let Acquired::Fill(guard) = cache.acquire("/abc123").await else {
            panic!("first caller should fill");
        };

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    match cache.acquire("/abc123").await {
                        Acquired::Hit(payload) => payload,
                        Acquired::Fill(_) => panic!("waiter should not fill"),
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.complete(payload(b"rendered once"));

        for waiter in waiters {
            let received = waiter.await.unwrap();
            assert_eq!(received, payload(b"rendered once"));
            assert!(!received.is_empty());
        }
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_waiter_takes_over_abandoned_fill() {
        let cache = RenderCache::new(Duration::from_secs(60));
        let Acquired::Fill(guard) = cache.acquire("/abc123").await else {
            panic!("first caller should fill");
        };

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                match cache.acquire("/abc123").await {
                    Acquired::Fill(guard) => {
                        guard.complete(payload(b"second try"));
                        true
                    }
                    Acquired::Hit(_) => false,
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(cache.lookup("/abc123"), Lookup::Hit(payload(b"second try")));
    }
}
