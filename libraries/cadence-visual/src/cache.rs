//! Decoded audio cache keyed by track URL

use crate::decode::DecodedAudio;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Bounded LRU of decoded tracks
///
/// A width change or a re-mount of the same track reuses the decoded PCM
/// instead of fetching and decoding again.
#[derive(Debug)]
pub struct DecodedCache {
    entries: Mutex<LruCache<String, DecodedAudio>>,
}

impl DecodedCache {
    /// Cache holding at most `capacity` tracks (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, url: &str) -> Option<DecodedAudio> {
        let hit = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();
        trace!(url = %url, hit = hit.is_some(), "Decoded cache lookup");
        hit
    }

    pub fn insert(&self, url: &str, audio: DecodedAudio) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(url.to_string(), audio);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(n: usize) -> DecodedAudio {
        DecodedAudio {
            samples: vec![0.0; n].into(),
            sample_rate: 8000,
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = DecodedCache::new(2);
        cache.insert("a", audio(1));
        cache.insert("b", audio(2));
        assert!(cache.get("a").is_some());

        cache.insert("c", audio(3));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let cache = DecodedCache::new(0);
        cache.insert("a", audio(1));
        assert_eq!(cache.len(), 1);
    }
}
