//! Best-effort mapping from notebook id to display name.
//!
//! The index is rebuilt by scanning every key under the configured prefix and
//! reading the `nbname` metadata of each object, one metadata fetch per
//! notebook. That scan is linear in the collection size and runs once at
//! startup.
//!
//! The index is never authoritative. Existence and listing always go to the
//! object store; the index only answers "what is this id called".

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{ObjectStore, StoreError};

/// Object metadata key holding a notebook's display name.
pub const NAME_METADATA_KEY: &str = "nbname";

/// Returned when the index is modified before its first rebuild.
#[derive(Debug, Error)]
#[error("Identity index has not been built yet")]
pub struct IndexNotReady;

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<String, String>,
    ready: bool,
}

/// Shared id → name table.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    state: RwLock<IndexState>,
}

impl IdentityIndex {
    /// Create an empty index that rejects updates until [`rebuild`](Self::rebuild) runs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mapping with a fresh scan of `store` under `prefix`.
    ///
    /// The write lock is held for the entire scan, so concurrent `update`
    /// calls wait until the rebuild has finished. On error the previous
    /// mapping is left in place. Returns the number of entries indexed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if listing or any metadata fetch fails.
    pub fn rebuild<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        prefix: &str,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut entries = HashMap::new();
        for object in store.list_objects(prefix)? {
            let Some(id) = object.key.strip_prefix(prefix).filter(|id| !id.is_empty()) else {
                continue;
            };

            let Some((_, metadata)) = store.head_object(&object.key)? else {
                debug!(key = %object.key, "object vanished during index rebuild");
                continue;
            };

            match metadata.get(NAME_METADATA_KEY) {
                Some(name) => {
                    entries.insert(id.to_string(), name.clone());
                }
                None => warn!(key = %object.key, "object has no {NAME_METADATA_KEY} metadata"),
            }
        }

        let count = entries.len();
        state.entries = entries;
        state.ready = true;
        info!(prefix = %prefix, count, "rebuilt identity index");
        Ok(count)
    }

    /// Insert or overwrite a single mapping.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotReady` if the index has never been rebuilt.
    pub fn update(&self, id: &str, name: &str) -> Result<(), IndexNotReady> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.ready {
            return Err(IndexNotReady);
        }
        state.entries.insert(id.to_string(), name.to_string());
        Ok(())
    }

    /// Drop the mapping for `id`, returning the name it had.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotReady` if the index has never been rebuilt.
    pub fn remove(&self, id: &str) -> Result<Option<String>, IndexNotReady> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.ready {
            return Err(IndexNotReady);
        }
        Ok(state.entries.remove(id))
    }

    /// Move the mapping for `old_id` to `new_id`, keeping its name.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotReady` if the index has never been rebuilt.
    pub fn rename(&self, old_id: &str, new_id: &str) -> Result<(), IndexNotReady> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.ready {
            return Err(IndexNotReady);
        }
        if let Some(name) = state.entries.remove(old_id) {
            state.entries.insert(new_id.to_string(), name);
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(id).cloned()
    }

    /// All `(id, name)` pairs sorted by name, then id.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(String, String)> = state
            .entries
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a rebuild has completed at least once.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).ready
    }
}
