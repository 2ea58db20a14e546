//! Storage manager that keeps each notebook as one object under a key prefix.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::{IdentityIndex, NAME_METADATA_KEY};
use crate::manager::{
    Checkpoint, IncomingModel, ManagerError, ModelKind, NotebookModel, StorageManager,
};
use crate::notebook::{FormatError, JsonNotebookFormat, Notebook, NotebookFormat};
use crate::storage::{ObjectMetadata, ObjectStore, StoreError};

/// Maximum length of a notebook id.
const MAX_ID_LENGTH: usize = 200;

/// Maximum length of the name-derived part of a generated id.
const MAX_SLUG_LENGTH: usize = 64;

/// Notebooks stored as `<prefix><id>` objects in an [`ObjectStore`].
///
/// Nothing is cached except the id → name index: every read and write goes
/// to the store, which stays the only source of truth.
pub struct ObjectNotebookManager<S, F = JsonNotebookFormat> {
    store: S,
    format: F,
    prefix: String,
    index: IdentityIndex,
}

impl<S: ObjectStore> ObjectNotebookManager<S, JsonNotebookFormat> {
    /// Open a manager using the `.ipynb` JSON format.
    ///
    /// # Errors
    ///
    /// See [`ObjectNotebookManager::with_format`].
    pub fn open(store: S, prefix: impl Into<String>) -> Result<Self, ManagerError> {
        Self::with_format(store, JsonNotebookFormat, prefix)
    }
}

impl<S: ObjectStore, F: NotebookFormat> ObjectNotebookManager<S, F> {
    /// Open a manager and build its identity index before returning.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if the initial index scan
    /// fails.
    pub fn with_format(store: S, format: F, prefix: impl Into<String>) -> Result<Self, ManagerError> {
        let manager = Self {
            store,
            format,
            prefix: prefix.into(),
            index: IdentityIndex::new(),
        };
        manager.index.rebuild(&manager.store, &manager.prefix)?;
        Ok(manager)
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Re-scan the store and replace the identity index.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if the scan fails.
    pub fn rebuild_index(&self) -> Result<usize, ManagerError> {
        Ok(self.index.rebuild(&self.store, &self.prefix)?)
    }

    fn key(&self, id: &str) -> Result<String, ManagerError> {
        validate_id(id)?;
        Ok(format!("{}{id}", self.prefix))
    }

    fn model(id: &str, last_modified: DateTime<Utc>, content: Option<serde_json::Value>) -> NotebookModel {
        NotebookModel {
            id: id.to_string(),
            name: id.to_string(),
            path: id.to_string(),
            created: last_modified,
            last_modified,
            kind: ModelKind::Notebook,
            content,
        }
    }

    /// Encode and write body plus name metadata, then record the name.
    fn store_notebook(&self, id: &str, notebook: &Notebook, name: &str) -> Result<(), ManagerError> {
        let key = self.key(id)?;
        let data = self.format.encode(notebook).map_err(ManagerError::Encode)?;
        let metadata = ObjectMetadata::from([(NAME_METADATA_KEY.to_string(), name.to_string())]);

        self.store.put_object(&key, &data, &metadata)?;
        self.index.update(id, name)?;

        info!(id = %id, name = %name, bytes = data.len(), "stored notebook");
        Ok(())
    }

    fn fetch_notebook(&self, id: &str) -> Result<(DateTime<Utc>, Notebook), ManagerError> {
        let key = self.key(id).map_err(|e| absent_if_invalid(id, e))?;
        let object = self
            .store
            .get_object(&key)
            .map_err(|e| absent_if_invalid(id, e.into()))?
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        let notebook = self
            .format
            .decode(&object.data)
            .map_err(|source| ManagerError::Decode {
                id: id.to_string(),
                source,
            })?;
        Ok((object.last_modified, notebook))
    }
}

impl<S: ObjectStore, F: NotebookFormat> StorageManager for ObjectNotebookManager<S, F> {
    fn exists(&self, id: &str) -> Result<bool, ManagerError> {
        let key = match self.key(id) {
            Ok(key) => key,
            Err(ManagerError::InvalidId { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        match self.store.head_object(&key) {
            Ok(found) => Ok(found.is_some()),
            Err(StoreError::InvalidKey { .. }) => Ok(false),
            Err(e) => Err(ManagerError::StoreUnavailable(e)),
        }
    }

    fn is_hidden(&self, _path: &str) -> bool {
        false
    }

    fn list_directories(&self, _path: &str) -> Vec<NotebookModel> {
        Vec::new()
    }

    fn get_directory_model(&self, _name: &str, _path: &str) -> Result<NotebookModel, ManagerError> {
        Err(ManagerError::Unsupported("directory models"))
    }

    fn list_notebooks(&self, _path: &str) -> Result<Vec<NotebookModel>, ManagerError> {
        let objects = self
            .store
            .list_objects(&self.prefix)
            .map_err(ManagerError::StoreUnavailable)?;

        let mut models: Vec<NotebookModel> = objects
            .into_iter()
            .filter_map(|object| {
                let id = object.key.strip_prefix(&self.prefix)?;
                (!id.is_empty()).then(|| Self::model(id, object.last_modified, None))
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models.dedup_by(|a, b| a.id == b.id);

        debug!(count = models.len(), prefix = %self.prefix, "listed notebooks");
        Ok(models)
    }

    fn get_notebook(
        &self,
        id: &str,
        _path: &str,
        include_content: bool,
    ) -> Result<NotebookModel, ManagerError> {
        if include_content {
            let (last_modified, notebook) = self.fetch_notebook(id)?;
            let content = notebook.to_value().map_err(ManagerError::Encode)?;
            return Ok(Self::model(id, last_modified, Some(content)));
        }

        let key = self.key(id).map_err(|e| absent_if_invalid(id, e))?;
        let (info, _) = self
            .store
            .head_object(&key)
            .map_err(|e| absent_if_invalid(id, e.into()))?
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        Ok(Self::model(id, info.last_modified, None))
    }

    fn save_notebook(
        &self,
        model: &IncomingModel,
        id: &str,
        path: &str,
    ) -> Result<NotebookModel, ManagerError> {
        let decode_error = |source: FormatError| ManagerError::Decode {
            id: id.to_string(),
            source,
        };

        let content = model
            .content
            .as_ref()
            .ok_or_else(|| decode_error(FormatError::Malformed("model has no content".to_string())))?;
        let raw = serde_json::to_vec(content).map_err(|e| decode_error(e.into()))?;
        let notebook = self.format.decode(&raw).map_err(decode_error)?;

        let name = notebook.name().unwrap_or(id).to_string();
        self.store_notebook(id, &notebook, &name)?;
        self.get_notebook(id, path, false)
    }

    fn update_notebook(
        &self,
        model: &IncomingModel,
        id: &str,
        path: &str,
    ) -> Result<NotebookModel, ManagerError> {
        let new_id = model.name.as_deref().unwrap_or(id);
        if new_id == id {
            return self.get_notebook(id, path, false);
        }

        let old_key = self.key(id)?;
        let new_key = self.key(new_id)?;

        match self.store.rename_object(&old_key, &new_key) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(ManagerError::NotFound(id.to_string())),
            Err(e) => {
                warn!(from = %id, to = %new_id, error = %e, "rename did not complete");
                return Err(e.into());
            }
        }
        self.index.rename(id, new_id)?;

        info!(from = %id, to = %new_id, "renamed notebook");
        self.get_notebook(new_id, path, false)
    }

    fn delete_notebook(&self, id: &str, _path: &str) -> Result<(), ManagerError> {
        let key = self.key(id)?;
        let existed = self.store.delete_object(&key)?;
        self.index.remove(id)?;

        if existed {
            info!(id = %id, "deleted notebook");
        } else {
            debug!(id = %id, "delete of absent notebook");
        }
        Ok(())
    }

    fn create_checkpoint(&self, _id: &str, _path: &str) -> Result<Checkpoint, ManagerError> {
        Err(ManagerError::Unsupported("checkpoints"))
    }

    fn list_checkpoints(&self, _id: &str, _path: &str) -> Vec<Checkpoint> {
        Vec::new()
    }

    fn restore_checkpoint(
        &self,
        _checkpoint_id: &str,
        _id: &str,
        _path: &str,
    ) -> Result<(), ManagerError> {
        Err(ManagerError::Unsupported("checkpoints"))
    }

    fn delete_checkpoint(
        &self,
        _checkpoint_id: &str,
        _id: &str,
        _path: &str,
    ) -> Result<(), ManagerError> {
        Err(ManagerError::Unsupported("checkpoints"))
    }

    fn read_notebook_object(&self, id: &str) -> Result<(DateTime<Utc>, Notebook), ManagerError> {
        self.fetch_notebook(id)
    }

    fn write_notebook_object(
        &self,
        notebook: &Notebook,
        id: Option<&str>,
    ) -> Result<String, ManagerError> {
        let name = notebook.name().ok_or(ManagerError::MissingName)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => new_notebook_id(name),
        };

        self.store_notebook(&id, notebook, name)?;
        Ok(id)
    }

    fn notebook_names(&self) -> Vec<(String, String)> {
        self.index.entries()
    }

    fn info_string(&self) -> String {
        format!("Serving notebooks from {}", self.store.describe())
    }
}

fn invalid_id(id: &str, reason: &str) -> ManagerError {
    ManagerError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Reads report ids the store cannot address as absent.
fn absent_if_invalid(id: &str, err: ManagerError) -> ManagerError {
    match err {
        ManagerError::InvalidId { .. } => ManagerError::NotFound(id.to_string()),
        other => other,
    }
}

/// Check that an id can be appended to the prefix as an object key.
///
/// Stores apply their own key rules on top of this.
fn validate_id(id: &str) -> Result<(), ManagerError> {
    if id.is_empty() {
        return Err(invalid_id(id, "id cannot be empty"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(invalid_id(
            id,
            &format!("id too long: {} chars (max {MAX_ID_LENGTH})", id.len()),
        ));
    }
    if id.chars().any(char::is_control) {
        return Err(invalid_id(id, "id contains control characters"));
    }
    Ok(())
}

/// Generate an id for a new notebook from its display name.
///
/// The id is the slugified name followed by eight random hex digits, or a
/// bare UUID when the name has no usable characters.
#[must_use]
pub fn new_notebook_id(name: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    let slug: String = slugify(name).chars().take(MAX_SLUG_LENGTH).collect();
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        uuid
    } else {
        format!("{slug}-{}", &uuid[..8])
    }
}

/// Convert a display name to a key-safe slug.
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
