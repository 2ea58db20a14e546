//! Local filesystem object store backend.
//!
//! A bucket is a directory under a root. Each object is a data file at
//! `<bucket>/<key>` plus a JSON sidecar at `<bucket>/<key>.meta.json` holding
//! its metadata map. Keys containing `/` become nested directories, so a key
//! cannot also be a leading part of another key: with `a` stored, writing
//! `a/b` is rejected as an invalid key, and the reverse as well.
//!
//! Reads and writes within one process go through a per-bucket lock, so a
//! reader always sees a body together with the metadata written with it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::{
    Credentials, ObjectInfo, ObjectMetadata, ObjectStore, StoreError, StoredObject,
};

const META_SUFFIX: &str = ".meta.json";
const TMP_SUFFIX: &str = ".nbstore-tmp";

/// Object store backed by a directory per bucket.
#[derive(Debug)]
pub struct LocalObjectStore {
    bucket: String,
    bucket_dir: PathBuf,
    // Held shared by readers and exclusively while a data/sidecar pair changes.
    lock: RwLock<()>,
}

impl LocalObjectStore {
    /// Connect to `bucket` under `root`.
    ///
    /// Local directories carry no authentication, so `credentials` only
    /// shows up in the connection log.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::BucketNotFound` if the bucket directory is missing
    /// and `create_bucket` is false, or `StoreError::InvalidKey` if the bucket
    /// name is not a single path segment.
    pub fn connect(
        root: &Path,
        bucket: &str,
        credentials: &Credentials,
        create_bucket: bool,
    ) -> Result<Self, StoreError> {
        validate_bucket_name(bucket)?;
        let bucket_dir = root.join(bucket);

        if !bucket_dir.is_dir() {
            if !create_bucket {
                return Err(StoreError::BucketNotFound(bucket_dir.display().to_string()));
            }
            fs::create_dir_all(&bucket_dir).map_err(|e| {
                StoreError::WriteError(format!("create bucket {}: {e}", bucket_dir.display()))
            })?;
            info!(bucket = %bucket, path = %bucket_dir.display(), "created bucket");
        }

        debug!(bucket = %bucket, "connected using {}", credentials.describe());
        Ok(Self {
            bucket: bucket.to_string(),
            bucket_dir,
            lock: RwLock::new(()),
        })
    }

    /// Directory holding this bucket's objects.
    #[must_use]
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn data_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }

    /// Reject keys that collide with the directory layout of other keys.
    fn check_layout(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        if path.is_dir() {
            return Err(invalid(key, "key is a leading part of existing keys"));
        }
        let blocked = path
            .ancestors()
            .skip(1)
            .take_while(|dir| *dir != self.bucket_dir.as_path())
            .any(Path::is_file);
        if blocked {
            return Err(invalid(key, "a leading part of the key is an existing object"));
        }
        Ok(())
    }

    fn meta_path(data_path: &Path) -> PathBuf {
        with_suffix(data_path, META_SUFFIX)
    }

    fn read_metadata(data_path: &Path) -> Result<ObjectMetadata, StoreError> {
        let meta_path = Self::meta_path(data_path);
        match fs::read(&meta_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::ReadError(format!("{}: {e}", meta_path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ObjectMetadata::new()),
            Err(e) => Err(StoreError::ReadError(format!("{}: {e}", meta_path.display()))),
        }
    }

    fn last_modified(path: &Path) -> Result<DateTime<Utc>, StoreError> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| StoreError::ReadError(format!("{}: {e}", path.display())))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.bucket_dir).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<ObjectInfo>) -> Result<(), StoreError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| StoreError::ListError(format!("{}: {e}", dir.display())))?;

        for entry in entries {
            let entry =
                entry.map_err(|e| StoreError::ListError(format!("{}: {e}", dir.display())))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| StoreError::ListError(format!("{}: {e}", path.display())))?;

            if file_type.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }

            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if is_reserved(&key) || !key.starts_with(prefix) {
                continue;
            }

            let last_modified = Self::last_modified(&path)
                .map_err(|e| StoreError::ListError(e.to_string()))?;
            out.push(ObjectInfo { key, last_modified });
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn get_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let path = self.data_path(key)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        if path.is_dir() {
            return Ok(None);
        }

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::ReadError(format!("{}: {e}", path.display()))),
        };

        Ok(Some(StoredObject {
            key: key.to_string(),
            metadata: Self::read_metadata(&path)?,
            last_modified: Self::last_modified(&path)?,
            data,
        }))
    }

    fn head_object(&self, key: &str) -> Result<Option<(ObjectInfo, ObjectMetadata)>, StoreError> {
        let path = self.data_path(key)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        if !path.is_file() {
            return Ok(None);
        }

        let info = ObjectInfo {
            key: key.to_string(),
            last_modified: Self::last_modified(&path)?,
        };
        Ok(Some((info, Self::read_metadata(&path)?)))
    }

    fn put_object(
        &self,
        key: &str,
        data: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let path = self.data_path(key)?;
        let meta_path = Self::meta_path(&path);
        let meta_bytes =
            serde_json::to_vec(metadata).map_err(|e| StoreError::WriteError(e.to_string()))?;

        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.check_layout(key, &path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::WriteError(format!("create dir {}: {e}", parent.display()))
            })?;
        }

        // Staging names are unique per write. Metadata is published before
        // data: the data file is what makes the key exist.
        let staging = format!(".{}{TMP_SUFFIX}", Uuid::new_v4().simple());
        let tmp_data = with_suffix(&path, &staging);
        let tmp_meta = with_suffix(&meta_path, &staging);
        let publish = || -> std::io::Result<()> {
            fs::write(&tmp_meta, &meta_bytes)?;
            fs::write(&tmp_data, data)?;
            fs::rename(&tmp_meta, &meta_path)?;
            fs::rename(&tmp_data, &path)
        };

        publish().map_err(|e| {
            let _ = fs::remove_file(&tmp_meta);
            let _ = fs::remove_file(&tmp_data);
            StoreError::WriteError(format!("{}: {e}", path.display()))
        })
    }

    fn delete_object(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.data_path(key)?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        if path.is_dir() {
            return Ok(false);
        }

        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::DeleteError(format!("{}: {e}", path.display()))),
        };

        let meta_path = Self::meta_path(&path);
        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::DeleteError(format!("{}: {e}", meta_path.display())));
            }
        }

        Ok(existed)
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        if !self.bucket_dir.is_dir() {
            return Err(StoreError::BucketNotFound(
                self.bucket_dir.display().to_string(),
            ));
        }

        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let mut objects = Vec::new();
        self.walk(&self.bucket_dir, prefix, &mut objects)?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn describe(&self) -> String {
        format!("local bucket {} at {}", self.bucket, self.bucket_dir.display())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn is_reserved(key: &str) -> bool {
    key.ends_with(META_SUFFIX) || key.ends_with(TMP_SUFFIX)
}

fn invalid(key: &str, reason: &str) -> StoreError {
    StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_bucket_name(bucket: &str) -> Result<(), StoreError> {
    if bucket.trim().is_empty() {
        return Err(invalid(bucket, "bucket name cannot be empty"));
    }
    if bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
        return Err(invalid(bucket, "bucket name must be a single path segment"));
    }
    Ok(())
}

/// Validate that a key stays inside the bucket directory.
///
/// Rejects empty keys, absolute keys, `..`/`.` segments, empty segments and
/// names reserved for sidecar and staging files.
fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(invalid(key, "key cannot be empty"));
    }
    if key.starts_with('/') || Path::new(key).is_absolute() {
        return Err(invalid(key, "key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid(key, "key cannot contain backslashes"));
    }
    if key.split('/').any(str::is_empty) {
        return Err(invalid(key, "key cannot contain empty segments"));
    }
    for component in Path::new(key).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(invalid(key, "key cannot contain '.' or '..' segments"));
        }
    }
    if is_reserved(key) {
        return Err(invalid(key, "key uses a reserved suffix"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalObjectStore {
        LocalObjectStore::connect(temp.path(), "notebooks", &Credentials::Ambient, true).unwrap()
    }

    fn named(name: &str) -> ObjectMetadata {
        ObjectMetadata::from([("nbname".to_string(), name.to_string())])
    }

    mod connect_tests {
        use super::*;

        #[test]
        fn missing_bucket_without_create_fails() {
            let temp = TempDir::new().unwrap();
            let err = LocalObjectStore::connect(temp.path(), "absent", &Credentials::Ambient, false)
                .unwrap_err();
            assert!(matches!(err, StoreError::BucketNotFound(_)));
        }

        #[test]
        fn create_bucket_makes_directory() {
            let temp = TempDir::new().unwrap();
            let store = store(&temp);
            assert!(store.bucket_dir().is_dir());
        }

        #[test]
        fn bucket_name_must_be_single_segment() {
            let temp = TempDir::new().unwrap();
            for bucket in ["", "a/b", ".."] {
                let result =
                    LocalObjectStore::connect(temp.path(), bucket, &Credentials::Ambient, true);
                assert!(result.is_err(), "expected {bucket:?} to be rejected");
            }
        }
    }

    mod key_validation_tests {
        use super::*;

        #[test]
        fn accepts_nested_keys() {
            assert!(validate_key("nb/report.ipynb").is_ok());
            assert!(validate_key("plain").is_ok());
        }

        #[test]
        fn rejects_traversal() {
            assert!(validate_key("../etc/passwd").is_err());
            assert!(validate_key("nb/../../x").is_err());
            assert!(validate_key("nb/./x").is_err());
        }

        #[test]
        fn rejects_absolute_and_empty_segments() {
            assert!(validate_key("/etc/passwd").is_err());
            assert!(validate_key("nb//x").is_err());
            assert!(validate_key("nb/").is_err());
            assert!(validate_key("").is_err());
        }

        #[test]
        fn rejects_reserved_suffixes() {
            assert!(validate_key("nb/x.meta.json").is_err());
            assert!(validate_key("nb/x.nbstore-tmp").is_err());
        }
    }

    #[test]
    fn put_get_round_trip_with_metadata() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.put_object("nb/abc", b"{\"cells\":[]}", &named("Report")).unwrap();
        let object = store.get_object("nb/abc").unwrap().unwrap();

        assert_eq!(object.data, b"{\"cells\":[]}");
        assert_eq!(object.metadata, named("Report"));
        assert!(temp.path().join("notebooks/nb/abc.meta.json").exists());
    }

    #[test]
    fn head_returns_metadata_without_body() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("abc", b"body", &named("Report")).unwrap();

        let (info, metadata) = store.head_object("abc").unwrap().unwrap();
        assert_eq!(info.key, "abc");
        assert_eq!(metadata, named("Report"));
        assert!(store.head_object("missing").unwrap().is_none());
    }

    #[test]
    fn object_without_sidecar_has_empty_metadata() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::write(store.bucket_dir().join("raw"), b"x").unwrap();

        let object = store.get_object("raw").unwrap().unwrap();
        assert!(object.metadata.is_empty());
    }

    #[test]
    fn list_skips_sidecars_and_respects_prefix() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("nb/b", b"", &named("B")).unwrap();
        store.put_object("nb/a", b"", &named("A")).unwrap();
        store.put_object("elsewhere", b"", &named("E")).unwrap();

        let keys: Vec<String> = store
            .list_objects("nb/")
            .unwrap()
            .into_iter()
            .map(|info| info.key)
            .collect();
        assert_eq!(keys, vec!["nb/a", "nb/b"]);
        assert_eq!(store.list_objects("").unwrap().len(), 3);
    }

    #[test]
    fn list_fails_when_bucket_removed() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::remove_dir_all(store.bucket_dir()).unwrap();
        assert!(matches!(
            store.list_objects(""),
            Err(StoreError::BucketNotFound(_))
        ));
    }

    #[test]
    fn delete_removes_data_and_sidecar() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("abc", b"x", &named("X")).unwrap();

        assert!(store.delete_object("abc").unwrap());
        assert!(!store.bucket_dir().join("abc").exists());
        assert!(!store.bucket_dir().join("abc.meta.json").exists());
        assert!(!store.delete_object("abc").unwrap());
    }

    #[test]
    fn key_and_key_prefix_cannot_coexist() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("a", b"x", &named("A")).unwrap();
        store.put_object("b/c", b"y", &named("C")).unwrap();

        let nested = store.put_object("a/b", b"z", &named("AB")).unwrap_err();
        assert!(matches!(nested, StoreError::InvalidKey { .. }), "{nested}");
        let shadowing = store.put_object("b", b"z", &named("B")).unwrap_err();
        assert!(matches!(shadowing, StoreError::InvalidKey { .. }), "{shadowing}");

        assert_eq!(store.get_object("a").unwrap().unwrap().data, b"x");
        assert!(store.get_object("b").unwrap().is_none());
        assert!(!store.delete_object("b").unwrap());
    }

    #[test]
    fn concurrent_same_key_writes_stay_paired() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("k", b"seed", &named("seed")).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..50 {
                        let tag = format!("w{writer}-{n}");
                        store.put_object("k", tag.as_bytes(), &named(&tag)).unwrap();
                    }
                });
            }
            let store = &store;
            scope.spawn(move || {
                for _ in 0..200 {
                    let object = store.get_object("k").unwrap().unwrap();
                    let body = String::from_utf8(object.data).unwrap();
                    assert_eq!(object.metadata.get("nbname"), Some(&body));
                }
            });
        });

        let object = store.get_object("k").unwrap().unwrap();
        let body = String::from_utf8(object.data).unwrap();
        assert_eq!(object.metadata.get("nbname"), Some(&body));

        let leftovers: Vec<_> = fs::read_dir(store.bucket_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(TMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn rename_moves_files() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.put_object("old", b"x", &named("X")).unwrap();

        store.rename_object("old", "new").unwrap();
        assert!(store.get_object("old").unwrap().is_none());
        assert_eq!(store.get_object("new").unwrap().unwrap().metadata, named("X"));
    }
}
