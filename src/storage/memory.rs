//! In-memory object store backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use crate::storage::{ObjectInfo, ObjectMetadata, ObjectStore, StoreError, StoredObject};

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock` and are
/// cloned on read and write. Writes and deletes can be made to fail on demand
/// so callers can exercise their partial-failure paths.
pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bucket("memory")
    }

    /// Create a new empty store reporting the given bucket name.
    #[must_use]
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `put_object` fail (or succeed again).
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete_object` fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of objects currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let map = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn put_object(
        &self,
        key: &str,
        data: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::WriteError(format!("{key}: injected failure")));
        }

        let object = StoredObject {
            key: key.to_string(),
            data: data.to_vec(),
            metadata: metadata.clone(),
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), object);
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Result<bool, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::DeleteError(format!("{key}: injected failure")));
        }
        let mut map = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        Ok(map.remove(key).is_some())
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let map = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .range::<String, _>(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, object)| object.info())
            .collect())
    }

    fn describe(&self) -> String {
        format!("memory bucket {}", self.bucket)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.get_object("nope").unwrap().is_none());
    }

    #[test]
    fn put_then_get() {
        let store = InMemoryObjectStore::new();
        let meta = ObjectMetadata::from([("nbname".to_string(), "Report".to_string())]);
        store.put_object("nb/abc", b"{}", &meta).unwrap();

        let object = store.get_object("nb/abc").unwrap().unwrap();
        assert_eq!(object.key, "nb/abc");
        assert_eq!(object.data, b"{}");
        assert_eq!(object.metadata.get("nbname").map(String::as_str), Some("Report"));
    }

    #[test]
    fn put_overwrites() {
        let store = InMemoryObjectStore::new();
        store.put_object("k", b"one", &ObjectMetadata::new()).unwrap();
        store.put_object("k", b"two", &ObjectMetadata::new()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_object("k").unwrap().unwrap().data, b"two");
    }

    #[test]
    fn empty_key_rejected() {
        let store = InMemoryObjectStore::new();
        let err = store.put_object("", b"x", &ObjectMetadata::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[test]
    fn list_filters_by_prefix() {
        let store = InMemoryObjectStore::new();
        for key in ["nb/b", "nb/a", "other/c", "nb-x"] {
            store.put_object(key, b"", &ObjectMetadata::new()).unwrap();
        }

        let keys: Vec<String> = store
            .list_objects("nb/")
            .unwrap()
            .into_iter()
            .map(|info| info.key)
            .collect();
        assert_eq!(keys, vec!["nb/a", "nb/b"]);
    }

    #[test]
    fn list_with_empty_prefix_returns_everything() {
        let store = InMemoryObjectStore::new();
        store.put_object("a", b"", &ObjectMetadata::new()).unwrap();
        store.put_object("b/c", b"", &ObjectMetadata::new()).unwrap();
        assert_eq!(store.list_objects("").unwrap().len(), 2);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryObjectStore::new();
        store.put_object("k", b"", &ObjectMetadata::new()).unwrap();
        assert!(store.delete_object("k").unwrap());
        assert!(!store.delete_object("k").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn injected_put_failure_writes_nothing() {
        let store = InMemoryObjectStore::new();
        store.fail_puts(true);
        assert!(store.put_object("k", b"x", &ObjectMetadata::new()).is_err());
        assert!(store.is_empty());

        store.fail_puts(false);
        assert!(store.put_object("k", b"x", &ObjectMetadata::new()).is_ok());
    }
}
