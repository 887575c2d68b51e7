//! Resident cache entries and the distance-based eviction/selection policy.
//!
//! The policy keeps a symmetric neighborhood: the `cache_limit` snapshots
//! nearest (in listing distance) to wherever the viewer currently is, with
//! the most distant discarded first as closer positions arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::trace;

use crate::index::ListingRemap;

/// One resident snapshot: its decoded payload and the modification time of
/// the backing file at decode time.
pub(crate) struct CacheEntry<P> {
    payload: Arc<P>,
    mtime: SystemTime,
}

/// The set of resident entries, keyed by listing position.
///
/// Invariants: positions are unique and valid under the current listing;
/// size never exceeds `cache_limit` across two completed maintenance ticks.
pub(crate) struct CacheSet<P> {
    entries: HashMap<usize, CacheEntry<P>>,
}

/// Absolute listing distance between two positions.
pub(crate) fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

impl<P> CacheSet<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, position: usize) -> bool {
        self.entries.contains_key(&position)
    }

    /// The cached payload at `position`, if resident.
    pub(crate) fn get(&self, position: usize) -> Option<Arc<P>> {
        self.entries.get(&position).map(|e| Arc::clone(&e.payload))
    }

    /// The stored modification time of the entry at `position`.
    pub(crate) fn mtime(&self, position: usize) -> Option<SystemTime> {
        self.entries.get(&position).map(|e| e.mtime)
    }

    pub(crate) fn insert(&mut self, position: usize, payload: Arc<P>, mtime: SystemTime) {
        self.entries.insert(position, CacheEntry { payload, mtime });
    }

    pub(crate) fn remove(&mut self, position: usize) {
        self.entries.remove(&position);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// The resident positions, in arbitrary order.
    pub(crate) fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    /// Rewrite every resident position through a listing remap, dropping
    /// entries whose files no longer exist.
    ///
    /// Applied to every entry, not only the current one: a stale numeric
    /// position under a changed listing would silently alias a different
    /// file.
    pub(crate) fn apply_remap(&mut self, remap: &ListingRemap) {
        let old = std::mem::take(&mut self.entries);
        for (position, entry) in old {
            match remap.remap(position) {
                Some(new_position) => {
                    self.entries.insert(new_position, entry);
                }
                None => trace!(position, "dropping entry for removed file"),
            }
        }
    }

    /// The resident position farthest from `current`. Ties break by map
    /// iteration order; distance is the only significant property.
    fn farthest_from(&self, current: usize) -> Option<usize> {
        self.entries
            .keys()
            .copied()
            .max_by_key(|&p| distance(p, current))
    }

    /// Enforce the hard capacity bound: evict farthest-first until at most
    /// `cache_limit` entries remain.
    pub(crate) fn trim(&mut self, cache_limit: usize, current: usize) {
        while self.entries.len() > cache_limit {
            if let Some(victim) = self.farthest_from(current) {
                trace!(position = victim, "evicting over-capacity entry");
                self.entries.remove(&victim);
            }
        }
    }

    /// Make room for `candidate` when the cache sits exactly at capacity.
    ///
    /// Returns `false` (no eviction) if the candidate is not strictly closer
    /// to `current` than the farthest resident entry — caching it would only
    /// churn the working set. Under capacity this is a no-op returning
    /// `true`: free slots are filled without evicting.
    pub(crate) fn make_room(
        &mut self,
        cache_limit: usize,
        current: usize,
        candidate: usize,
    ) -> bool {
        if self.entries.len() < cache_limit {
            return true;
        }
        match self.farthest_from(current) {
            Some(victim) if distance(candidate, current) < distance(victim, current) => {
                trace!(position = victim, "evicting to make room");
                self.entries.remove(&victim);
                true
            }
            _ => false,
        }
    }

    /// Choose the next position to prefetch: the closest uncached in-range
    /// neighbor of `current`, probing the forward side first at each
    /// distance.
    ///
    /// Starts at `current + 1` and reflects across `current` whenever the
    /// probe is cached or out of range, alternating sides. Abandons once the
    /// probe's distance exceeds `cache_limit`: anything farther would be the
    /// eviction policy's first victim anyway.
    pub(crate) fn select_candidate(
        &self,
        current: usize,
        listing_len: usize,
        cache_limit: usize,
    ) -> Option<usize> {
        let cur = current as i64;
        let len = listing_len as i64;
        let mut probe = cur + 1;
        loop {
            if (0..len).contains(&probe) && !self.contains(probe as usize) {
                return Some(probe as usize);
            }
            // Mirror to the opposite side of `current`; coming from below,
            // the +1 steps the reflection one position farther out.
            probe = 2 * cur - probe + i64::from(probe < cur);
            if (probe - cur).unsigned_abs() as usize > cache_limit {
                return None;
            }
        }
    }
}
