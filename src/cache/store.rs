use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::warn;

use crate::domain::entities::PostRecord;

pub const DEFAULT_FEED_TTL: Duration = Duration::from_secs(20);

struct CachedFeed {
    stored_at: Instant,
    posts: Vec<PostRecord>,
}

/// Single-entry TTL cache holding the full global post collection.
///
/// Reads and writes go through the shared lock without any further
/// coordination; concurrent refreshes may race and the last write wins,
/// which is acceptable because every stored value is a fresh snapshot.
pub struct FeedCache {
    slot: RwLock<Option<CachedFeed>>,
    ttl: Duration,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // A panic while holding the lock leaves at worst a stale snapshot, so a
    // poisoned lock is recovered rather than propagated.
    fn read_slot(&self) -> RwLockReadGuard<'_, Option<CachedFeed>> {
        self.slot.read().unwrap_or_else(|poisoned| {
            warn!(
                target = "scribo::cache",
                "feed cache lock poisoned, continuing with recovered state"
            );
            poisoned.into_inner()
        })
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<CachedFeed>> {
        self.slot.write().unwrap_or_else(|poisoned| {
            warn!(
                target = "scribo::cache",
                "feed cache lock poisoned, continuing with recovered state"
            );
            poisoned.into_inner()
        })
    }

    /// Return the cached collection when present and not expired.
    pub fn get(&self) -> Option<Vec<PostRecord>> {
        let guard = self.read_slot();
        match guard.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                counter!("scribo_feed_cache_hit_total").increment(1);
                Some(entry.posts.clone())
            }
            _ => {
                counter!("scribo_feed_cache_miss_total").increment(1);
                None
            }
        }
    }

    pub fn put(&self, posts: Vec<PostRecord>) {
        counter!("scribo_feed_cache_store_total").increment(1);
        *self.write_slot() = Some(CachedFeed {
            stored_at: Instant::now(),
            posts,
        });
    }

    /// Drop the cached collection immediately.
    pub fn clear(&self) {
        *self.write_slot() = None;
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_TTL)
    }
}
