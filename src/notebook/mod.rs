//! Notebook documents and their on-disk JSON format.
//!
//! [`Notebook`] is the canonical in-memory form (nbformat 4, cells at the top
//! level). [`JsonNotebookFormat`] reads both nbformat 4 and the older
//! worksheet-based nbformat 3 layout, and always writes nbformat 4.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Major format version written by [`JsonNotebookFormat::encode`].
pub const CURRENT_NBFORMAT: u64 = 4;

/// Oldest major format version accepted by [`JsonNotebookFormat::decode`].
pub const OLDEST_NBFORMAT: u64 = 3;

/// Errors raised while reading or writing notebook documents.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid notebook JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unsupported nbformat version {0}")]
    Unsupported(u64),

    #[error("Malformed notebook: {0}")]
    Malformed(String),
}

/// A notebook in canonical (nbformat 4) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Value>,
    pub metadata: Map<String, Value>,
    pub nbformat: u64,
    pub nbformat_minor: u64,
}

impl Notebook {
    /// An empty nbformat 4 notebook.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            nbformat: CURRENT_NBFORMAT,
            nbformat_minor: 0,
        }
    }

    /// An empty notebook whose metadata carries `name`.
    #[must_use]
    pub fn named(name: &str) -> Self {
        let mut notebook = Self::empty();
        notebook.set_name(name);
        notebook
    }

    /// The display name stored in `metadata.name`, if present and non-blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn set_name(&mut self, name: &str) {
        self.metadata
            .insert("name".to_string(), Value::String(name.to_string()));
    }

    /// Convert to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::InvalidJson` if serialization fails.
    pub fn to_value(&self) -> Result<Value, FormatError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Serializer/deserializer for stored notebook bodies.
pub trait NotebookFormat: Send + Sync {
    /// Parse stored bytes into canonical form.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the bytes are not a readable notebook.
    fn decode(&self, bytes: &[u8]) -> Result<Notebook, FormatError>;

    /// Serialize a canonical notebook to bytes.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the notebook cannot be serialized.
    fn encode(&self, notebook: &Notebook) -> Result<Vec<u8>, FormatError>;
}

/// The `.ipynb` JSON format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNotebookFormat;

impl NotebookFormat for JsonNotebookFormat {
    fn decode(&self, bytes: &[u8]) -> Result<Notebook, FormatError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut root) = value else {
            return Err(FormatError::Malformed(
                "notebook must be a JSON object".to_string(),
            ));
        };

        let version = match root.get("nbformat") {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| FormatError::Malformed("nbformat must be an integer".to_string()))?,
            None if root.contains_key("worksheets") => 3,
            None if root.contains_key("cells") => 4,
            None => return Err(FormatError::Malformed("missing nbformat".to_string())),
        };

        let metadata = match root.remove("metadata") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(FormatError::Malformed(
                    "metadata must be an object".to_string(),
                ));
            }
        };

        match version {
            4 => {
                let cells = take_array(&mut root, "cells")?;
                check_cells(&cells)?;
                Ok(Notebook {
                    cells,
                    metadata,
                    nbformat: 4,
                    nbformat_minor: root
                        .get("nbformat_minor")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                })
            }
            3 => {
                let mut cells = Vec::new();
                for worksheet in take_array(&mut root, "worksheets")? {
                    let Value::Object(mut worksheet) = worksheet else {
                        return Err(FormatError::Malformed(
                            "worksheet must be an object".to_string(),
                        ));
                    };
                    for cell in take_array(&mut worksheet, "cells")? {
                        cells.push(upgrade_v3_cell(cell)?);
                    }
                }
                Ok(Notebook {
                    cells,
                    metadata,
                    nbformat: CURRENT_NBFORMAT,
                    nbformat_minor: 0,
                })
            }
            other => Err(FormatError::Unsupported(other)),
        }
    }

    fn encode(&self, notebook: &Notebook) -> Result<Vec<u8>, FormatError> {
        if notebook.nbformat != CURRENT_NBFORMAT {
            return Err(FormatError::Unsupported(notebook.nbformat));
        }
        check_cells(&notebook.cells)?;
        Ok(serde_json::to_vec_pretty(notebook)?)
    }
}

/// Remove `field` from `object` as an array; a missing field is empty.
fn take_array(object: &mut Map<String, Value>, field: &str) -> Result<Vec<Value>, FormatError> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(FormatError::Malformed(format!("{field} must be an array"))),
    }
}

fn check_cells(cells: &[Value]) -> Result<(), FormatError> {
    for (index, cell) in cells.iter().enumerate() {
        let has_type = cell
            .as_object()
            .and_then(|c| c.get("cell_type"))
            .is_some_and(Value::is_string);
        if !has_type {
            return Err(FormatError::Malformed(format!(
                "cell {index} must be an object with a cell_type"
            )));
        }
    }
    Ok(())
}

/// Join a multi-line source (string or list of strings) into one string.
fn source_text(source: Option<&Value>) -> String {
    match source {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

/// Rewrite a worksheet-era cell into its nbformat 4 shape.
fn upgrade_v3_cell(cell: Value) -> Result<Value, FormatError> {
    let Value::Object(mut cell) = cell else {
        return Err(FormatError::Malformed("cell must be an object".to_string()));
    };
    let cell_type = cell
        .get("cell_type")
        .and_then(Value::as_str)
        .ok_or_else(|| FormatError::Malformed("cell is missing cell_type".to_string()))?
        .to_string();
    let metadata = match cell.remove("metadata") {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let mut upgraded = Map::new();
    match cell_type.as_str() {
        "code" => {
            upgraded.insert("cell_type".to_string(), Value::from("code"));
            upgraded.insert(
                "execution_count".to_string(),
                cell.remove("prompt_number").unwrap_or(Value::Null),
            );
            upgraded.insert("metadata".to_string(), metadata);
            let outputs = take_array(&mut cell, "outputs")?
                .into_iter()
                .map(upgrade_v3_output)
                .collect::<Result<Vec<_>, _>>()?;
            upgraded.insert("outputs".to_string(), Value::Array(outputs));
            upgraded.insert(
                "source".to_string(),
                Value::String(source_text(cell.get("input"))),
            );
        }
        "heading" => {
            let level = cell
                .get("level")
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .clamp(1, 6);
            let hashes = "#".repeat(usize::try_from(level).unwrap_or(1));
            let text = source_text(cell.get("source"));
            upgraded.insert("cell_type".to_string(), Value::from("markdown"));
            upgraded.insert("metadata".to_string(), metadata);
            upgraded.insert("source".to_string(), Value::String(format!("{hashes} {text}")));
        }
        _ => {
            upgraded.insert("cell_type".to_string(), Value::String(cell_type));
            upgraded.insert("metadata".to_string(), metadata);
            upgraded.insert(
                "source".to_string(),
                Value::String(source_text(cell.get("source"))),
            );
        }
    }
    Ok(Value::Object(upgraded))
}

/// Worksheet-era output keys and the MIME types they became.
const V3_MIME_KEYS: [(&str, &str); 8] = [
    ("text", "text/plain"),
    ("html", "text/html"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpeg", "image/jpeg"),
    ("latex", "text/latex"),
    ("javascript", "application/javascript"),
    ("json", "application/json"),
];

/// Rewrite a worksheet-era code cell output into its nbformat 4 shape.
///
/// Unknown output types are kept as they are.
fn upgrade_v3_output(output: Value) -> Result<Value, FormatError> {
    let Value::Object(mut output) = output else {
        return Err(FormatError::Malformed("output must be an object".to_string()));
    };
    let output_type = output
        .get("output_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut upgraded = Map::new();
    match output_type.as_str() {
        "pyout" | "display_data" => {
            let mut data = Map::new();
            for (key, mime) in V3_MIME_KEYS {
                if let Some(value) = output.remove(key) {
                    data.insert(mime.to_string(), Value::String(source_text(Some(&value))));
                }
            }
            let metadata = match output.remove("metadata") {
                Some(Value::Object(map)) => Value::Object(map),
                _ => Value::Object(Map::new()),
            };
            if output_type == "pyout" {
                upgraded.insert("output_type".to_string(), Value::from("execute_result"));
                upgraded.insert(
                    "execution_count".to_string(),
                    output.remove("prompt_number").unwrap_or(Value::Null),
                );
            } else {
                upgraded.insert("output_type".to_string(), Value::from("display_data"));
            }
            upgraded.insert("data".to_string(), Value::Object(data));
            upgraded.insert("metadata".to_string(), metadata);
        }
        "pyerr" => {
            upgraded.insert("output_type".to_string(), Value::from("error"));
            for field in ["ename", "evalue"] {
                let value = output.remove(field).unwrap_or_else(|| Value::from(""));
                upgraded.insert(field.to_string(), value);
            }
            upgraded.insert(
                "traceback".to_string(),
                Value::Array(take_array(&mut output, "traceback")?),
            );
        }
        "stream" => {
            let name = output
                .remove("stream")
                .or_else(|| output.remove("name"))
                .unwrap_or_else(|| Value::from("stdout"));
            upgraded.insert("output_type".to_string(), Value::from("stream"));
            upgraded.insert("name".to_string(), name);
            upgraded.insert(
                "text".to_string(),
                Value::String(source_text(output.get("text"))),
            );
        }
        _ => return Ok(Value::Object(output)),
    }
    Ok(Value::Object(upgraded))
}
