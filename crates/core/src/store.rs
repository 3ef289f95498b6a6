//! On-disk persistence for the job template.
//!
//! One human-readable JSON file per deployment, overwritten wholesale on
//! save. The store is read once at startup; requests work from the
//! in-memory copy and never write back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::CoreError;
use crate::template::JobTemplate;

pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted template. Returns `Ok(None)` when the file does
    /// not exist or holds nothing (`null`, `[]`, `""`, `false`, `0`).
    /// Any other non-object document is a parse error.
    pub async fn load(&self) -> Result<Option<JobTemplate>, CoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::Storage {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&text)?;
        if is_blank(&value) {
            return Ok(None);
        }

        JobTemplate::from_value(value).map(Some)
    }

    /// Persist `template`, replacing any previous content.
    pub async fn save(&self, template: &JobTemplate) -> Result<(), CoreError> {
        let mut text = serde_json::to_string_pretty(template)?;
        text.push('\n');

        tokio::fs::write(&self.path, text)
            .await
            .map_err(|source| CoreError::Storage {
                path: self.path.clone(),
                source,
            })
    }

    /// Load the persisted template, installing `default` first when the
    /// file is missing or holds an empty document.
    pub async fn load_or_install(&self, default: JobTemplate) -> Result<JobTemplate, CoreError> {
        match self.load().await? {
            Some(template) if !template.is_empty() => {
                tracing::info!(
                    path = %self.path.display(),
                    nodes = template.len(),
                    "Loaded job template",
                );
                Ok(template)
            }
            _ => {
                self.save(&default).await?;
                tracing::info!(
                    path = %self.path.display(),
                    nodes = default.len(),
                    "Installed default job template",
                );
                Ok(default)
            }
        }
    }
}

/// JSON values that carry no template at all.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}
