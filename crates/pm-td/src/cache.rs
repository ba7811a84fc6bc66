//! TTL read-through cache for hot account queries.
//!
//! One [`TtlCache`] per query kind (balance, positions) is owned by each
//! trader. A read lock guards the hit path; the fetch itself runs with no
//! lock held, and only the store takes a write lock.
//!
//! Concurrent misses are not coalesced: overlapping callers may each fetch,
//! and the last writer wins. Backend reads are idempotent so this only costs
//! an extra request.

use std::future::Future;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// A single cached value with a fixed time-to-live.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached value if it is younger than the TTL, otherwise run
    /// `fetch` and store its result.
    ///
    /// A failed fetch leaves any stale entry untouched and returns the error.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let guard = self.slot.read().await;
            if let Some(entry) = guard.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = fetch().await?;

        *self.slot.write().await = Some(Entry {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Drop the cached value so the next read fetches.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}
