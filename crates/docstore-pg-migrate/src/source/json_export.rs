//! Document source reading a directory export.
//!
//! Each collection is one file in the export directory:
//!
//! - `<collection>.json`: an array of documents carrying an `id` field, or
//!   an object mapping document id to document fields
//! - `<collection>.jsonl`: one document (with `id`) per line
//!
//! A collection with no file reads as empty, the same as a collection that
//! was never written in the document store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::{DocumentSource, RawRecord, StoreResult};
use crate::error::StoreError;

/// Document id field in array and line-delimited exports.
const ID_FIELD: &str = "id";

/// [`DocumentSource`] over an export directory.
#[derive(Debug, Clone)]
pub struct JsonExportSource {
    root: PathBuf,
}

impl JsonExportSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn ensure_root(&self) -> StoreResult<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::permanent(format!(
                "export path {} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(io_error(&self.root, e)),
        }
    }

    async fn read_optional(&self, path: &Path) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    let message = format!("{}: {}", path.display(), e);
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            StoreError::transient(message)
        }
        _ => StoreError::permanent(message),
    }
}

#[async_trait]
impl DocumentSource for JsonExportSource {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.ensure_root().await?;
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let path = entry.path();
            let is_export = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("jsonl")
            );
            if !is_export {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn read_all(&self, collection: &str) -> StoreResult<Vec<RawRecord>> {
        self.ensure_root().await?;

        let json_path = self.root.join(format!("{}.json", collection));
        if let Some(content) = self.read_optional(&json_path).await? {
            debug!("Reading {}", json_path.display());
            return parse_json(&json_path, &content);
        }

        let lines_path = self.root.join(format!("{}.jsonl", collection));
        if let Some(content) = self.read_optional(&lines_path).await? {
            debug!("Reading {}", lines_path.display());
            return parse_json_lines(&lines_path, &content);
        }

        debug!("No export file for collection {}", collection);
        Ok(Vec::new())
    }
}

fn parse_json(path: &Path, content: &str) -> StoreResult<Vec<RawRecord>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| StoreError::permanent(format!("{}: {}", path.display(), e)))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| document_with_id(path, i + 1, item))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(id, fields)| match fields {
                Value::Object(fields) => Ok(RawRecord::new(id, fields)),
                _ => Err(StoreError::permanent(format!(
                    "{}: document {} is not an object",
                    path.display(),
                    id
                ))),
            })
            .collect(),
        _ => Err(StoreError::permanent(format!(
            "{}: expected an array or object of documents",
            path.display()
        ))),
    }
}

fn parse_json_lines(path: &Path, content: &str) -> StoreResult<Vec<RawRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: Value = serde_json::from_str(line).map_err(|e| {
                StoreError::permanent(format!("{} line {}: {}", path.display(), i + 1, e))
            })?;
            document_with_id(path, i + 1, value)
        })
        .collect()
}

/// Split the `id` field off a document.
fn document_with_id(path: &Path, position: usize, value: Value) -> StoreResult<RawRecord> {
    let Value::Object(mut fields) = value else {
        return Err(StoreError::permanent(format!(
            "{}: document {} is not an object",
            path.display(),
            position
        )));
    };
    let id = match fields.remove(ID_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(StoreError::permanent(format!(
                "{}: document {} has no \"{}\"",
                path.display(),
                position,
                ID_FIELD
            )))
        }
    };
    Ok(RawRecord::new(id, fields))
}
