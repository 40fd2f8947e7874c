use dashmap::DashMap;
use tracing::debug;

use super::{CacheProvider, CachedResponsePointer, CachedResult, Clock, SystemClock};

/// In-process [`CacheProvider`] backed by a concurrent map.
///
/// Entries are keyed by namespaces plus unique id. An entry is fresh while
/// `now < stored_at + validity`, so a pointer with validity `0` is stored
/// but never served.
pub struct MemoryCacheProvider<C = SystemClock> {
    entries: DashMap<Key, Entry>,
    clock: C,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    namespaces: Vec<String>,
    unique_id: String,
}

struct Entry {
    result: CachedResult,
    validity: u32,
    integrity_tag: Option<String>,
}

impl Entry {
    fn expires_at(&self) -> u64 {
        self.result.stored_at().saturating_add(u64::from(self.validity))
    }
}

impl MemoryCacheProvider<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryCacheProvider<SystemClock> {
    fn default() -> Self { Self::new() }
}

impl<C: Clock> MemoryCacheProvider<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { entries: DashMap::new(), clock }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Drop every entry tagged with `namespace`. Returns how many went.
    pub fn purge_namespace(&self, namespace: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.namespaces.iter().any(|ns| ns == namespace));
        let purged = before.saturating_sub(self.entries.len());
        debug!(namespace, purged, "cache namespace purged");
        purged
    }
}

fn key(pointer: &CachedResponsePointer) -> Key {
    Key {
        namespaces: pointer.namespaces().to_vec(),
        unique_id: pointer.unique_id().to_owned(),
    }
}

impl<C: Clock> CacheProvider for MemoryCacheProvider<C> {
    fn get(&self, pointer: &CachedResponsePointer) -> Option<CachedResult> {
        let key = key(pointer);
        let now = self.clock.now();

        {
            let entry = self.entries.get(&key)?;
            if entry.integrity_tag.as_deref() != pointer.integrity_tag() {
                return None;
            }
            if now < entry.expires_at() {
                return Some(entry.result.clone());
            }
        }

        // Read guard dropped above: removing under it would deadlock the shard.
        // A concurrent store may have refreshed the slot in between.
        self.entries.remove_if(&key, |_, entry| now >= entry.expires_at());
        None
    }

    fn store(&self, pointer: &CachedResponsePointer, result: CachedResult) {
        self.entries.insert(key(pointer), Entry {
            result,
            validity: pointer.validity(),
            integrity_tag: pointer.integrity_tag().map(str::to_owned),
        });
    }

    fn delete(&self, pointer: &CachedResponsePointer) {
        self.entries.remove(&key(pointer));
    }

    fn timestamp(&self) -> u64 {
        self.clock.now()
    }
}
