//! Command implementations used by the CLI.

use std::fmt::Write;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::StoreConfig;
use crate::manager::object::ObjectNotebookManager;
use crate::manager::{IncomingModel, NotebookModel, StorageManager};
use crate::notebook::{JsonNotebookFormat, Notebook, NotebookFormat};
use crate::storage::local::LocalObjectStore;

/// Manager over the local directory backend.
pub type LocalManager = ObjectNotebookManager<LocalObjectStore>;

/// Connect to the configured bucket and build the identity index.
///
/// # Errors
///
/// Returns an error if the bucket is missing (and `create_bucket` is off)
/// or the initial index scan fails.
pub fn open(config: &StoreConfig) -> anyhow::Result<LocalManager> {
    let store = LocalObjectStore::connect(
        &config.root_path(),
        &config.bucket,
        &config.credentials(),
        config.create_bucket,
    )
    .with_context(|| format!("Cannot open bucket '{}'", config.bucket))?;

    Ok(ObjectNotebookManager::open(store, config.prefix.clone())?)
}

/// Create the configured bucket, returning its directory.
///
/// # Errors
///
/// Returns an error if the bucket directory cannot be created.
pub fn init(config: &StoreConfig) -> anyhow::Result<PathBuf> {
    let store = LocalObjectStore::connect(
        &config.root_path(),
        &config.bucket,
        &config.credentials(),
        true,
    )?;
    Ok(store.bucket_dir().to_path_buf())
}

/// Read command input from a file, or stdin when no file is given.
///
/// # Errors
///
/// Returns an error if the input cannot be read.
pub fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Cannot read stdin")?;
            Ok(buffer)
        }
    }
}

/// Save raw notebook JSON under `id`.
///
/// # Errors
///
/// Returns an error if the input is not JSON or the manager rejects it.
pub fn save(manager: &impl StorageManager, id: &str, raw: &str) -> anyhow::Result<NotebookModel> {
    let content: serde_json::Value =
        serde_json::from_str(raw).context("Input is not valid JSON")?;
    manager
        .save_notebook(&IncomingModel::with_content(content), id, "")
        .with_context(|| format!("Failed to save notebook {id}"))
}

/// Store a named notebook through the legacy write path, returning its id.
///
/// # Errors
///
/// Returns an error if the input is not a notebook, has no name, or cannot
/// be stored.
pub fn import(manager: &impl StorageManager, id: Option<&str>, raw: &str) -> anyhow::Result<String> {
    let notebook = JsonNotebookFormat
        .decode(raw.as_bytes())
        .context("Input is not a readable notebook")?;
    manager
        .write_notebook_object(&notebook, id)
        .context("Failed to import notebook")
}

/// Fetch a notebook through the legacy read path.
///
/// # Errors
///
/// Returns an error if the notebook is missing or unreadable.
pub fn export(manager: &impl StorageManager, id: &str) -> anyhow::Result<(DateTime<Utc>, Notebook)> {
    manager
        .read_notebook_object(id)
        .with_context(|| format!("Failed to export notebook {id}"))
}

/// Move `from` to `to`.
///
/// # Errors
///
/// Returns an error if `from` does not exist or the store fails mid-rename.
pub fn rename(manager: &impl StorageManager, from: &str, to: &str) -> anyhow::Result<NotebookModel> {
    manager
        .update_notebook(&IncomingModel::renamed(to), from, "")
        .with_context(|| format!("Failed to rename {from} to {to}"))
}

/// Render models as `id<TAB>last_modified` lines.
#[must_use]
pub fn format_listing(models: &[NotebookModel]) -> String {
    models.iter().fold(String::new(), |mut out, model| {
        let _ = writeln!(
            out,
            "{}\t{}",
            model.id,
            model.last_modified.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        out
    })
}

/// Render `(id, name)` pairs as `id<TAB>name` lines.
#[must_use]
pub fn format_names(names: &[(String, String)]) -> String {
    names.iter().fold(String::new(), |mut out, (id, name)| {
        let _ = writeln!(out, "{id}\t{name}");
        out
    })
}
