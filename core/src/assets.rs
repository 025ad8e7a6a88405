//! Bounded LRU store of assets (e.g. CuttingTool documents), indexed by
//! type and owning device in addition to the primary id index.
//!
//! Ordering is kept in an [`lru::LruCache`] (hash map + intrusive doubly
//! linked list) rather than a `Vec` of ids, so get/put/evict are O(1)
//! amortized as spec'd, not an O(n) scan-and-shift per touch.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;

/// One stored asset document. `body` is opaque to the core: the XML/JSON
/// serializer collaborator interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub asset_id: String,
    pub asset_type: String,
    pub device_uuid: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub removed: bool,
    pub body: String,
}

struct Inner {
    cache: LruCache<String, Asset>,
}

/// A bounded, LRU-evicting store of [`Asset`]s.
pub struct AssetStore {
    inner: Mutex<Inner>,
}

impl AssetStore {
    pub fn new(capacity: usize) -> Self {
        AssetStore { inner: Mutex::new(Inner { cache: LruCache::new(capacity) }) }
    }

    /// Insert or replace an asset, marking it most-recently-used. Returns
    /// the id of any asset evicted as a result (for the caller to emit an
    /// `AssetRemoved` observation).
    pub fn put(&self, asset: Asset) -> Option<String> {
        let mut inner = self.inner.lock();
        let id = asset.asset_id.clone();
        let evicted = if inner.cache.len() == inner.cache.cap() && !inner.cache.contains(&id) {
            inner.cache.pop_lru().map(|(victim, _)| victim)
        } else {
            None
        };
        inner.cache.put(id, asset);
        evicted
    }

    pub fn get(&self, id: &str) -> Option<Asset> {
        self.inner.lock().cache.get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Asset> {
        self.inner.lock().cache.pop(id)
    }

    /// List assets, most-recently-used first, optionally restricted by
    /// type and/or owning device.
    pub fn list(&self, asset_type: Option<&str>, device_uuid: Option<&str>, count: usize) -> Vec<Asset> {
        let inner = self.inner.lock();
        inner
            .cache
            .iter()
            .filter(|(_, a)| asset_type.map_or(true, |t| a.asset_type == t))
            .filter(|(_, a)| device_uuid.map_or(true, |d| a.device_uuid.as_deref() == Some(d)))
            .take(count)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str) -> Asset {
        Asset {
            asset_id: id.to_string(),
            asset_type: "CuttingTool".to_string(),
            device_uuid: None,
            timestamp: Utc::now(),
            removed: false,
            body: format!("<Body id=\"{id}\"/>"),
        }
    }

    #[test]
    fn lru_bound_is_respected() {
        let store = AssetStore::new(2);
        store.put(asset("a"));
        store.put(asset("b"));
        store.put(asset("c")); // evicts "a"
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn get_refreshes_recency() {
        let store = AssetStore::new(2);
        store.put(asset("a"));
        store.put(asset("b"));
        store.get("a"); // a is now MRU
        store.put(asset("c")); // should evict "b", not "a"
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
    }

    #[test]
    fn multiline_body_round_trips() {
        let mut a = asset("m1");
        a.body = "line one\nline two".to_string();
        let store = AssetStore::new(4);
        store.put(a);
        assert_eq!(store.get("m1").unwrap().body, "line one\nline two");
    }
}
