//! Upload persistence.
//!
//! Uploaded bytes are written under the upload directory as
//! `{document_id}_{filename}` and then handed to the document service by
//! path. Storage failures are errors; tool failures are reported inside the
//! returned [`UploadOutcome`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::mcp_client::client::ClientManager;
use crate::mcp_client::types::ToolCallResult;
use crate::services;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid filename '{filename}'")]
    InvalidFilename { filename: String },

    #[error("failed to store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A document written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub document_id: String,
    pub filename: String,
    pub file_path: PathBuf,
}

/// Result of storing a document and asking a service to process it.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document_id: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub processing_result: ToolCallResult,
}

impl UploadOutcome {
    fn new(stored: StoredDocument, processing_result: ToolCallResult) -> Self {
        Self {
            document_id: stored.document_id,
            filename: stored.filename,
            file_path: stored.file_path,
            processing_result,
        }
    }
}

pub struct DocumentStore {
    upload_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.upload_dir.clone())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Store `bytes` under a fresh document id.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<StoredDocument, DocumentError> {
        let filename = sanitize_filename(filename)?;
        let document_id = uuid::Uuid::new_v4().to_string();

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| DocumentError::Io {
                path: self.upload_dir.display().to_string(),
                source: e,
            })?;

        let file_path = self.upload_dir.join(format!("{document_id}_{filename}"));
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|e| DocumentError::Io {
                path: file_path.display().to_string(),
                source: e,
            })?;

        tracing::info!(
            document_id = %document_id,
            filename = %filename,
            path = %file_path.display(),
            bytes = bytes.len(),
            "stored uploaded document"
        );

        Ok(StoredDocument {
            document_id,
            filename,
            file_path,
        })
    }
}

/// Store a document and run it through the full processing pipeline.
pub async fn upload_document(
    manager: &ClientManager,
    store: &DocumentStore,
    filename: &str,
    bytes: &[u8],
) -> Result<UploadOutcome, DocumentError> {
    let stored = store.save(filename, bytes).await?;
    let result = services::process_document(
        manager,
        &stored.file_path,
        &stored.filename,
        &stored.document_id,
    )
    .await;
    Ok(UploadOutcome::new(stored, result))
}

/// Store a document and save its text without vectorizing it.
pub async fn upload_document_text_only(
    manager: &ClientManager,
    store: &DocumentStore,
    filename: &str,
    bytes: &[u8],
) -> Result<UploadOutcome, DocumentError> {
    let stored = store.save(filename, bytes).await?;
    let result = services::save_document_text(
        manager,
        &stored.file_path,
        &stored.filename,
        &stored.document_id,
    )
    .await;
    Ok(UploadOutcome::new(stored, result))
}

/// Keep only the final path component so uploads cannot escape the
/// upload directory.
fn sanitize_filename(filename: &str) -> Result<String, DocumentError> {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(DocumentError::InvalidFilename {
            filename: filename.to_string(),
        });
    }
    Ok(last.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
