//! Document library
//!
//! Lists the backend's documents and wraps upload, delete and metadata
//! edits. Every mutation reloads the list afterwards.

use crate::api::{ApiError, Document, DocumentUpload, Transport};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Largest file accepted for upload (10 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// File extensions the backend can index
pub const ACCEPTED_EXTENSIONS: &[&str] = &["txt", "pdf", "json", "md"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File is too large ({size} bytes, limit {MAX_UPLOAD_BYTES})")]
    TooLarge { size: u64 },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryState {
    pub documents: Vec<Document>,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct DocumentLibrary<T> {
    transport: T,
    state: Mutex<LibraryState>,
}

impl<T: Transport> DocumentLibrary<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(LibraryState::default()),
        }
    }

    pub fn snapshot(&self) -> LibraryState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        let mut state = self.lock();
        state.is_loading = true;
        state.error = None;
    }

    fn fail(&self, message: &str, error: &dyn std::error::Error) {
        tracing::warn!(error = %error, "{message}");
        let mut state = self.lock();
        state.is_loading = false;
        state.error = Some(message.to_string());
    }

    /// Reload the document list
    ///
    /// A failed reload empties the list.
    pub async fn refresh(&self) -> Result<Vec<Document>, ApiError> {
        self.start();
        match self.transport.list_documents().await {
            Ok(documents) => {
                let mut state = self.lock();
                state.documents.clone_from(&documents);
                state.is_loading = false;
                Ok(documents)
            }
            Err(error) => {
                self.fail("Failed to fetch documents", &error);
                self.lock().documents.clear();
                Err(error)
            }
        }
    }

    /// Upload a file from disk
    ///
    /// Type and size are checked before the file is read.
    pub async fn upload_file(
        &self,
        path: &Path,
        metadata: Option<Value>,
    ) -> Result<Document, DocumentError> {
        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let bytes = match read_checked(path, &file_name).await {
            Ok(bytes) => bytes,
            Err(error) => {
                self.fail("Failed to upload document", &error);
                return Err(error);
            }
        };
        self.upload(DocumentUpload {
            file_name,
            bytes,
            metadata,
        })
        .await
    }

    /// Upload in-memory content, then reload the list
    pub async fn upload(&self, upload: DocumentUpload) -> Result<Document, DocumentError> {
        if let Err(error) = validate(&upload) {
            self.fail("Failed to upload document", &error);
            return Err(error);
        }

        self.start();
        let document = match self.transport.upload_document(upload).await {
            Ok(document) => document,
            Err(error) => {
                self.fail("Failed to upload document", &error);
                return Err(error.into());
            }
        };
        self.refresh().await?;
        Ok(document)
    }

    /// Delete a document, then reload the list
    pub async fn remove(&self, document_id: &str) -> Result<(), ApiError> {
        self.start();
        if let Err(error) = self.transport.delete_document(document_id).await {
            self.fail("Failed to delete document", &error);
            return Err(error);
        }
        tracing::info!(document_id = %document_id, "Document deleted");
        self.refresh().await?;
        Ok(())
    }

    pub async fn metadata(&self, document_id: &str) -> Result<Value, ApiError> {
        self.transport.document_metadata(document_id).await
    }

    pub async fn update_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        self.transport
            .update_document_metadata(document_id, metadata)
            .await
    }
}

async fn read_checked(path: &Path, file_name: &str) -> Result<Vec<u8>, DocumentError> {
    let read_error = |source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    };
    check_type(file_name)?;
    let metadata = tokio::fs::metadata(path).await.map_err(read_error)?;
    check_size(metadata.len())?;
    tokio::fs::read(path).await.map_err(read_error)
}

fn validate(upload: &DocumentUpload) -> Result<(), DocumentError> {
    check_type(&upload.file_name)?;
    check_size(u64::try_from(upload.bytes.len()).unwrap_or(u64::MAX))
}

fn check_type(file_name: &str) -> Result<(), DocumentError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(DocumentError::UnsupportedType(file_name.to_string())),
    }
}

fn check_size(size: u64) -> Result<(), DocumentError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(DocumentError::TooLarge { size });
    }
    Ok(())
}

/// Name to show for a document
pub fn display_name(document: &Document) -> &str {
    document
        .filename
        .as_deref()
        .or(document.id.as_deref())
        .unwrap_or("Untitled")
}
