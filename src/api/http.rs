//! `reqwest` implementation of [`Transport`]

use super::types::{
    conversations_from_value, documents_from_value, ContinueRequest, ContinueResponse,
    ConversationDetail, ConversationSummary, ConversationUpdate, Document, DocumentUpload,
    HistoryPage, NewConversation,
};
use super::{ApiError, Transport};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Transport talking JSON over HTTP to the conversation/document service
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::network(format!("Connection failed: {e}"))
            } else {
                ApiError::network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }

        decode_body(&body)
    }
}

/// Decode a success body; an empty body decodes as JSON `null`
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::decode(format!("Failed to parse response: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn create_conversation(&self) -> Result<NewConversation, ApiError> {
        self.send(self.client.post(self.url("/conversation/create")))
            .await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let value: Value = self.send(self.client.get(self.url("/conversations"))).await?;
        conversations_from_value(value)
            .map_err(|e| ApiError::decode(format!("Failed to parse conversations: {e}")))
    }

    async fn conversation_detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError> {
        let mut query = vec![("message_limit", page.message_limit.to_string())];
        if let Some(before) = &page.before_timestamp {
            query.push(("before_timestamp", before.clone()));
        }
        let request = self
            .client
            .get(self.url(&format!("/conversation/{conversation_id}/detail")))
            .query(&query);
        self.send(request).await
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .patch(self.url(&format!("/conversation/{conversation_id}")))
            .json(update);
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        request: &ContinueRequest,
    ) -> Result<ContinueResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/conversation/{conversation_id}/continue")))
            .json(request);
        self.send(request).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/conversation/{conversation_id}")));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let value: Value = self.send(self.client.get(self.url("/documents"))).await?;
        documents_from_value(value)
            .map_err(|e| ApiError::decode(format!("Failed to parse documents: {e}")))
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, ApiError> {
        let DocumentUpload {
            file_name,
            bytes,
            metadata,
        } = upload;

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        if let Some(metadata) = metadata {
            form = form.text("metadata", metadata.to_string());
        }

        // No explicit content-type: reqwest sets the multipart boundary
        let request = self
            .client
            .post(self.url("/document/upload"))
            .multipart(form);
        self.send(request).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/document/{document_id}")));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn document_metadata(&self, document_id: &str) -> Result<Value, ApiError> {
        self.send(
            self.client
                .get(self.url(&format!("/document/{document_id}/metadata"))),
        )
        .await
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        let request = self
            .client
            .patch(self.url(&format!("/document/{document_id}/metadata")))
            .json(metadata);
        self.send(request).await
    }
}
