//! The storage-manager contract consumed by a notebook-serving host.
//!
//! A host depends only on [`StorageManager`]; [`object::ObjectNotebookManager`]
//! is the implementation that keeps notebooks in an [`ObjectStore`].
//!
//! [`ObjectStore`]: crate::storage::ObjectStore

pub mod object;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::index::IndexNotReady;
use crate::notebook::{FormatError, Notebook};
use crate::storage::StoreError;

/// Errors surfaced to the host by storage-manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Notebook does not exist: {0}")]
    NotFound(String),

    #[error("Unreadable notebook {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: FormatError,
    },

    #[error("Failed to serialize notebook: {0}")]
    Encode(#[source] FormatError),

    #[error("Missing notebook name")]
    MissingName,

    #[error("Invalid notebook id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Object store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("{0} is not supported by this storage manager")]
    Unsupported(&'static str),

    #[error(transparent)]
    IndexNotReady(#[from] IndexNotReady),
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey { key, reason } => ManagerError::InvalidId { id: key, reason },
            other => ManagerError::StoreUnavailable(other),
        }
    }
}

/// Coarse classification of [`ManagerError`] for host-side mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Decode,
    Encode,
    MissingName,
    InvalidId,
    StoreUnavailable,
    Unsupported,
    IndexNotReady,
}

impl ErrorKind {
    /// HTTP status a web host would answer with.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::MissingName | ErrorKind::Encode | ErrorKind::InvalidId => 400,
            ErrorKind::Decode => 500,
            ErrorKind::Unsupported => 501,
            ErrorKind::StoreUnavailable | ErrorKind::IndexNotReady => 503,
        }
    }
}

impl ManagerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::Decode { .. } => ErrorKind::Decode,
            ManagerError::Encode(_) => ErrorKind::Encode,
            ManagerError::MissingName => ErrorKind::MissingName,
            ManagerError::InvalidId { .. } => ErrorKind::InvalidId,
            ManagerError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            ManagerError::Unsupported(_) => ErrorKind::Unsupported,
            ManagerError::IndexNotReady(_) => ErrorKind::IndexNotReady,
        }
    }
}

/// What a model describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Notebook,
    Directory,
}

/// A notebook as presented to the host.
///
/// `content` is `Some` exactly when the caller asked for content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookModel {
    pub id: String,
    pub name: String,
    pub path: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// A model sent by the host on save or update. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingModel {
    /// Target id; differs from the current id on rename.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Notebook JSON in any format version the document format reads.
    #[serde(default)]
    pub content: Option<Value>,
}

impl IncomingModel {
    #[must_use]
    pub fn with_content(content: Value) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn renamed(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// A saved revision of a notebook. No backend here creates any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

/// Operations a notebook-serving host expects from its storage.
///
/// `path` arguments exist for host compatibility; stores without a
/// directory concept ignore them.
pub trait StorageManager: Send + Sync {
    /// Whether a notebook with this id exists in the backing store.
    ///
    /// An absent or unaddressable id yields `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if the store cannot be asked.
    fn exists(&self, id: &str) -> Result<bool, ManagerError>;

    /// Same as [`exists`](Self::exists) with the path taken as the id.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if the store cannot be asked.
    fn path_exists(&self, path: &str) -> Result<bool, ManagerError> {
        self.exists(path)
    }

    fn is_hidden(&self, path: &str) -> bool;

    fn list_directories(&self, path: &str) -> Vec<NotebookModel>;

    /// # Errors
    ///
    /// Returns `ManagerError::Unsupported` when directories are not modelled.
    fn get_directory_model(&self, name: &str, path: &str) -> Result<NotebookModel, ManagerError>;

    /// Every notebook currently stored, without content.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if enumeration fails.
    fn list_notebooks(&self, path: &str) -> Result<Vec<NotebookModel>, ManagerError>;

    /// # Errors
    ///
    /// Returns `ManagerError::NotFound` for an unknown id and
    /// `ManagerError::Decode` if content was requested but cannot be read.
    fn get_notebook(
        &self,
        id: &str,
        path: &str,
        include_content: bool,
    ) -> Result<NotebookModel, ManagerError>;

    /// Store `model.content` under `id`; returns the model without content.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::Decode` if the content is not a notebook, or
    /// any encode or store failure.
    fn save_notebook(
        &self,
        model: &IncomingModel,
        id: &str,
        path: &str,
    ) -> Result<NotebookModel, ManagerError>;

    /// Rename `id` to `model.name` when they differ; returns the model
    /// without content.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::NotFound` if `id` does not exist, or the store
    /// failure that interrupted the rename.
    fn update_notebook(
        &self,
        model: &IncomingModel,
        id: &str,
        path: &str,
    ) -> Result<NotebookModel, ManagerError>;

    /// Remove a notebook. Deleting an absent id succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::StoreUnavailable` if the store rejects the delete.
    fn delete_notebook(&self, id: &str, path: &str) -> Result<(), ManagerError>;

    /// # Errors
    ///
    /// Returns `ManagerError::Unsupported` when checkpoints are not kept.
    fn create_checkpoint(&self, id: &str, path: &str) -> Result<Checkpoint, ManagerError>;

    fn list_checkpoints(&self, id: &str, path: &str) -> Vec<Checkpoint>;

    /// # Errors
    ///
    /// Returns `ManagerError::Unsupported` when checkpoints are not kept.
    fn restore_checkpoint(
        &self,
        checkpoint_id: &str,
        id: &str,
        path: &str,
    ) -> Result<(), ManagerError>;

    /// # Errors
    ///
    /// Returns `ManagerError::Unsupported` when checkpoints are not kept.
    fn delete_checkpoint(
        &self,
        checkpoint_id: &str,
        id: &str,
        path: &str,
    ) -> Result<(), ManagerError>;

    /// Legacy read: the stored document and its modification time.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::NotFound` or `ManagerError::Decode`.
    fn read_notebook_object(&self, id: &str) -> Result<(DateTime<Utc>, Notebook), ManagerError>;

    /// Legacy write: store a document, generating an id when none is given.
    /// Returns the id written.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::MissingName` if the document has no
    /// `metadata.name`, `ManagerError::Encode` if it cannot be serialized,
    /// or the store failure that rejected the write.
    fn write_notebook_object(
        &self,
        notebook: &Notebook,
        id: Option<&str>,
    ) -> Result<String, ManagerError>;

    /// `(id, display name)` pairs known to the identity index, by name.
    fn notebook_names(&self) -> Vec<(String, String)>;

    /// One-line description for the host's startup banner.
    fn info_string(&self) -> String;
}
