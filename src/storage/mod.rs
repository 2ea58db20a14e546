//! Object store capability and implementations.
//!
//! This module provides an abstraction over a flat key/value blob store
//! (an S3-style bucket), allowing nbstore to keep notebooks in different
//! backends. Keys are plain strings; any "directory" structure is only a
//! naming convention expressed through key prefixes.

pub mod local;
pub mod memory;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Small string map stored out-of-band next to an object's body.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to read: {0}")]
    ReadError(String),

    #[error("Failed to write: {0}")]
    WriteError(String),

    #[error("Failed to delete: {0}")]
    DeleteError(String),

    #[error("Failed to list: {0}")]
    ListError(String),
}

/// Credentials handed to a store when connecting.
///
/// `Ambient` means "let the store client resolve credentials itself"
/// (environment, instance profile, ...). Blank strings are never used to mean
/// this; see [`crate::config::StoreConfig::credentials`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Ambient,
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl Credentials {
    /// Short label safe to log (never includes the secret).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Credentials::Ambient => "ambient credentials".to_string(),
            Credentials::Static { access_key_id, .. } => {
                format!("static credentials for {access_key_id}")
            }
        }
    }
}

/// Listing entry: a key and when it was last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// A full object as returned by [`ObjectStore::get_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub data: Vec<u8>,
    pub metadata: ObjectMetadata,
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    /// The listing view of this object.
    #[must_use]
    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            key: self.key.clone(),
            last_modified: self.last_modified,
        }
    }
}

/// Trait for object store backends (local directory, in-memory, S3, etc.).
///
/// Implementations must make `put_object` all-or-nothing from the caller's
/// point of view: body and metadata are either both visible or neither is.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's body, metadata and modification time.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be reached or read.
    fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Fetch only an object's metadata and modification time.
    ///
    /// The default implementation fetches the full object and drops the body.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be reached or read.
    fn head_object(&self, key: &str) -> Result<Option<(ObjectInfo, ObjectMetadata)>, StoreError> {
        Ok(self
            .get_object(key)?
            .map(|object| (object.info(), object.metadata)))
    }

    /// Create or overwrite an object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the object cannot be written.
    fn put_object(&self, key: &str, data: &[u8], metadata: &ObjectMetadata)
    -> Result<(), StoreError>;

    /// Remove an object. Returns `true` if the key existed.
    ///
    /// Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend rejects the delete.
    fn delete_object(&self, key: &str) -> Result<bool, StoreError>;

    /// List every key starting with `prefix`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if any part of the enumeration fails; partial
    /// listings are never returned.
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Move an object to a new key.
    ///
    /// The default implementation copies then deletes. If the copy fails
    /// nothing has changed. If the delete fails the error is returned and
    /// both keys exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `old_key` does not exist, or any
    /// error raised by the copy or the delete.
    fn rename_object(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        if old_key == new_key {
            return Ok(());
        }

        let object = self
            .get_object(old_key)?
            .ok_or_else(|| StoreError::NotFound(old_key.to_string()))?;

        self.put_object(new_key, &object.data, &object.metadata)?;
        self.delete_object(old_key)?;
        Ok(())
    }

    /// Human-readable backend label used in status messages.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryObjectStore;

    fn meta(name: &str) -> ObjectMetadata {
        ObjectMetadata::from([("nbname".to_string(), name.to_string())])
    }

    mod rename_tests {
        use super::*;

        #[test]
        fn rename_moves_body_and_metadata() {
            let store = InMemoryObjectStore::new();
            store.put_object("nb/a", b"body", &meta("A")).unwrap();

            store.rename_object("nb/a", "nb/b").unwrap();

            assert!(store.get_object("nb/a").unwrap().is_none());
            let moved = store.get_object("nb/b").unwrap().unwrap();
            assert_eq!(moved.data, b"body");
            assert_eq!(moved.metadata, meta("A"));
        }

        #[test]
        fn rename_missing_source_is_not_found() {
            let store = InMemoryObjectStore::new();
            let err = store.rename_object("nb/missing", "nb/b").unwrap_err();
            assert!(matches!(err, StoreError::NotFound(key) if key == "nb/missing"));
        }

        #[test]
        fn rename_to_same_key_is_noop() {
            let store = InMemoryObjectStore::new();
            store.put_object("nb/a", b"body", &meta("A")).unwrap();
            store.rename_object("nb/a", "nb/a").unwrap();
            assert!(store.get_object("nb/a").unwrap().is_some());
        }

        #[test]
        fn failed_copy_leaves_source_untouched() {
            let store = InMemoryObjectStore::new();
            store.put_object("nb/a", b"body", &meta("A")).unwrap();
            store.fail_puts(true);

            assert!(store.rename_object("nb/a", "nb/b").is_err());
            assert!(store.get_object("nb/a").unwrap().is_some());
            assert!(store.get_object("nb/b").unwrap().is_none());
        }

        #[test]
        fn failed_delete_leaves_both_keys() {
            let store = InMemoryObjectStore::new();
            store.put_object("nb/a", b"body", &meta("A")).unwrap();
            store.fail_deletes(true);

            assert!(store.rename_object("nb/a", "nb/b").is_err());
            assert!(store.get_object("nb/a").unwrap().is_some());
            assert!(store.get_object("nb/b").unwrap().is_some());
        }
    }

    mod credentials_tests {
        use super::*;

        #[test]
        fn describe_never_leaks_secret() {
            let creds = Credentials::Static {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "hunter2".to_string(),
            };
            let label = creds.describe();
            assert!(label.contains("AKIDEXAMPLE"));
            assert!(!label.contains("hunter2"));
        }
    }
}
