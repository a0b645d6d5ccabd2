//! Client for the conversation/document service
//!
//! Provides a common interface over the backend's JSON/HTTP API so the
//! stores can be driven by the real service or an in-memory mock.

mod error;
mod http;
mod types;

#[cfg(test)]
pub mod testing;

pub use error::{ApiError, ApiErrorKind};
pub use http::HttpTransport;
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Every call the client makes against the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST /conversation/create`
    async fn create_conversation(&self) -> Result<NewConversation, ApiError>;

    /// `GET /conversations`
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;

    /// `GET /conversation/{id}/detail`
    async fn conversation_detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError>;

    /// `PATCH /conversation/{id}`
    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), ApiError>;

    /// `POST /conversation/{id}/continue`
    async fn continue_conversation(
        &self,
        conversation_id: &str,
        request: &ContinueRequest,
    ) -> Result<ContinueResponse, ApiError>;

    /// `DELETE /conversation/{id}`
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;

    /// `GET /documents`
    async fn list_documents(&self) -> Result<Vec<Document>, ApiError>;

    /// `POST /document/upload` (multipart)
    async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, ApiError>;

    /// `DELETE /document/{id}`
    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError>;

    /// `GET /document/{id}/metadata`
    async fn document_metadata(&self, document_id: &str) -> Result<Value, ApiError>;

    /// `PATCH /document/{id}/metadata`
    async fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError>;
}

// ============================================================================
// Arc implementation for shared transports
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn create_conversation(&self) -> Result<NewConversation, ApiError> {
        (**self).create_conversation().await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        (**self).list_conversations().await
    }

    async fn conversation_detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError> {
        (**self).conversation_detail(conversation_id, page).await
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), ApiError> {
        (**self).update_conversation(conversation_id, update).await
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        request: &ContinueRequest,
    ) -> Result<ContinueResponse, ApiError> {
        (**self).continue_conversation(conversation_id, request).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        (**self).delete_conversation(conversation_id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        (**self).list_documents().await
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, ApiError> {
        (**self).upload_document(upload).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        (**self).delete_document(document_id).await
    }

    async fn document_metadata(&self, document_id: &str) -> Result<Value, ApiError> {
        (**self).document_metadata(document_id).await
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        (**self).update_document_metadata(document_id, metadata).await
    }
}

// ============================================================================
// Logging wrapper
// ============================================================================

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

fn log_outcome<R>(operation: &'static str, started: Instant, result: &Result<R, ApiError>) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(_) => {
            tracing::debug!(operation, duration_ms = %duration_ms, "API request completed");
        }
        Err(e) => {
            tracing::warn!(
                operation,
                duration_ms = %duration_ms,
                status = e.status,
                kind = ?e.kind,
                error = %e.message,
                "API request failed"
            );
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn create_conversation(&self) -> Result<NewConversation, ApiError> {
        let started = Instant::now();
        let result = self.inner.create_conversation().await;
        log_outcome("create_conversation", started, &result);
        result
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let started = Instant::now();
        let result = self.inner.list_conversations().await;
        log_outcome("list_conversations", started, &result);
        result
    }

    async fn conversation_detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError> {
        let started = Instant::now();
        let result = self.inner.conversation_detail(conversation_id, page).await;
        log_outcome("conversation_detail", started, &result);
        result
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), ApiError> {
        let started = Instant::now();
        let result = self.inner.update_conversation(conversation_id, update).await;
        log_outcome("update_conversation", started, &result);
        result
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        request: &ContinueRequest,
    ) -> Result<ContinueResponse, ApiError> {
        let started = Instant::now();
        let result = self.inner.continue_conversation(conversation_id, request).await;
        if let Ok(response) = &result {
            tracing::info!(
                conversation_id,
                strategy = %request.strategy,
                sources = response.sources.len(),
                duration_ms = %started.elapsed().as_millis(),
                "Answer received"
            );
        }
        log_outcome("continue_conversation", started, &result);
        result
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let started = Instant::now();
        let result = self.inner.delete_conversation(conversation_id).await;
        log_outcome("delete_conversation", started, &result);
        result
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let started = Instant::now();
        let result = self.inner.list_documents().await;
        log_outcome("list_documents", started, &result);
        result
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, ApiError> {
        let started = Instant::now();
        let file_name = upload.file_name.clone();
        let size = upload.bytes.len();
        let result = self.inner.upload_document(upload).await;
        if result.is_ok() {
            tracing::info!(file_name = %file_name, size, "Document uploaded");
        }
        log_outcome("upload_document", started, &result);
        result
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        let started = Instant::now();
        let result = self.inner.delete_document(document_id).await;
        log_outcome("delete_document", started, &result);
        result
    }

    async fn document_metadata(&self, document_id: &str) -> Result<Value, ApiError> {
        let started = Instant::now();
        let result = self.inner.document_metadata(document_id).await;
        log_outcome("document_metadata", started, &result);
        result
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        let started = Instant::now();
        let result = self.inner.update_document_metadata(document_id, metadata).await;
        log_outcome("update_document_metadata", started, &result);
        result
    }
}
