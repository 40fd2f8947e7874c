//! Response cache contract.
//!
//! A controller that can serve a stored response builds a
//! [`CachedResponsePointer`], asks a [`CacheProvider`] for it, and on a hit
//! returns [`Outcome::Cached`](crate::Outcome::Cached). The dispatcher emits
//! the stored headers and body as they are.
//!
//! ```rust
//! use http::StatusCode;
//! use keel::cache::{CacheProvider, CachedResponsePointer, CachedResult, MemoryCacheProvider};
//!
//! let cache = MemoryCacheProvider::new();
//! let pointer = CachedResponsePointer::new("user:42", ["users"], 300).unwrap();
//!
//! assert!(cache.get(&pointer).is_none());
//! cache.store(&pointer, CachedResult::new(StatusCode::OK, vec![], b"{}".to_vec(), cache.timestamp()));
//! assert!(cache.get(&pointer).is_some());
//! ```
//!
//! Providers own staleness. Each call is expected to be atomic on its own;
//! nothing spans a `get` and the following `store`, so two requests racing
//! to fill the same slot simply leave the last store in place.

mod memory;
mod pointer;
mod result;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use memory::MemoryCacheProvider;
pub use pointer::CachedResponsePointer;
pub use result::CachedResult;

/// Storage for previously computed responses.
pub trait CacheProvider: Send + Sync {
    /// `None` means not cached, expired, or stored under another integrity tag.
    fn get(&self, pointer: &CachedResponsePointer) -> Option<CachedResult>;

    /// Overwrites any prior entry for the same pointer.
    fn store(&self, pointer: &CachedResponsePointer, result: CachedResult);

    /// Deleting an absent entry is a no-op.
    fn delete(&self, pointer: &CachedResponsePointer);

    /// The provider's clock, in seconds. All TTL math uses this value.
    fn timestamp(&self) -> u64;
}

// ── Clocks ────────────────────────────────────────────────────────────────────

/// Time source for a provider.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self { Self(AtomicU64::new(start)) }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 { self.0.load(Ordering::SeqCst) }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> u64 { (**self).now() }
}
