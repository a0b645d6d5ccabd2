//! Mock transport for testing
//!
//! Lets store tests run without a backend: responses are queued up front
//! and every request is recorded.

use super::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{oneshot, Notify};

/// In-memory transport with queued answers and injectable failures
#[derive(Default)]
pub struct MockTransport {
    created: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<Result<ContinueResponse, ApiError>>>,
    details: Mutex<HashMap<String, ConversationDetail>>,
    conversations: Mutex<Vec<ConversationSummary>>,
    documents: Mutex<Vec<Document>>,
    metadata: Mutex<HashMap<String, Value>>,
    /// Next call of the named operation fails with this error
    failures: Mutex<HashMap<&'static str, ApiError>>,
    /// Holds the next continue request until the sender fires
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    /// Notified when a continue request starts
    pub continue_started: Notify,
    /// Record of continue requests
    pub continued: Mutex<Vec<(String, ContinueRequest)>>,
    /// Record of conversation updates
    pub updates: Mutex<Vec<(String, ConversationUpdate)>>,
    /// Record of uploads
    pub uploads: Mutex<Vec<DocumentUpload>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the id returned by the next `create_conversation`
    pub fn queue_conversation(&self, conversation_id: impl Into<String>) {
        self.created.lock().unwrap().push_back(conversation_id.into());
    }

    /// Queue a successful answer
    pub fn queue_answer(&self, text: impl Into<String>) {
        self.answers.lock().unwrap().push_back(Ok(ContinueResponse {
            response: text.into(),
            ..ContinueResponse::default()
        }));
    }

    /// Queue a full answer
    pub fn queue_response(&self, response: ContinueResponse) {
        self.answers.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a failing answer
    pub fn queue_error(&self, error: ApiError) {
        self.answers.lock().unwrap().push_back(Err(error));
    }

    /// Make the next call of `operation` fail
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// Serve this detail for `GET /conversation/{id}/detail`
    pub fn insert_detail(&self, detail: ConversationDetail) {
        self.details
            .lock()
            .unwrap()
            .insert(detail.summary.conversation_id.clone(), detail);
    }

    pub fn insert_conversation(&self, summary: ConversationSummary) {
        self.conversations.lock().unwrap().push(summary);
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.lock().unwrap().push(document);
    }

    /// Block the next continue request until the returned sender fires
    pub fn hold_next_answer(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn recorded_questions(&self) -> Vec<String> {
        self.continued
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.question.clone())
            .collect()
    }

    fn check(&self, operation: &'static str) -> Result<(), ApiError> {
        match self.failures.lock().unwrap().remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::new(ApiErrorKind::NotFound, format!("{what} not found"), 404)
}

#[async_trait]
impl Transport for MockTransport {
    async fn create_conversation(&self) -> Result<NewConversation, ApiError> {
        self.check("create_conversation")?;
        let conversation_id = self
            .created
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::network("No mock conversation queued"))?;
        Ok(NewConversation { conversation_id })
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.check("list_conversations")?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn conversation_detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError> {
        self.check("conversation_detail")?;
        let mut detail = self
            .details
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| not_found("Conversation"))?;
        let limit = usize::try_from(page.message_limit).unwrap_or(usize::MAX);
        if detail.messages.len() > limit {
            detail.messages = detail.messages.split_off(detail.messages.len() - limit);
        }
        Ok(detail)
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), ApiError> {
        self.check("update_conversation")?;
        self.updates
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), update.clone()));
        if let Some(title) = &update.title {
            if let Some(detail) = self.details.lock().unwrap().get_mut(conversation_id) {
                detail.summary.title = Some(title.clone());
            }
            for summary in self.conversations.lock().unwrap().iter_mut() {
                if summary.conversation_id == conversation_id {
                    summary.title = Some(title.clone());
                }
            }
        }
        Ok(())
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        request: &ContinueRequest,
    ) -> Result<ContinueResponse, ApiError> {
        self.continued
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), request.clone()));
        self.continue_started.notify_one();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::network("No mock response queued")))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.check("delete_conversation")?;
        let mut conversations = self.conversations.lock().unwrap();
        let before = conversations.len();
        conversations.retain(|c| c.conversation_id != conversation_id);
        if conversations.len() == before {
            return Err(not_found("Conversation"));
        }
        self.details.lock().unwrap().remove(conversation_id);
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        self.check("list_documents")?;
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, ApiError> {
        self.check("upload_document")?;
        let mut documents = self.documents.lock().unwrap();
        let document = Document {
            id: Some(format!("doc-{}", documents.len() + 1)),
            filename: Some(upload.file_name.clone()),
            metadata: upload.metadata.clone(),
            ..Document::default()
        };
        documents.push(document.clone());
        self.uploads.lock().unwrap().push(upload);
        Ok(document)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        self.check("delete_document")?;
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| d.id.as_deref() != Some(document_id));
        if documents.len() == before {
            return Err(not_found("Document"));
        }
        Ok(())
    }

    async fn document_metadata(&self, document_id: &str) -> Result<Value, ApiError> {
        self.check("document_metadata")?;
        self.metadata
            .lock()
            .unwrap()
            .get(document_id)
            .cloned()
            .ok_or_else(|| not_found("Document"))
    }

    async fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &Value,
    ) -> Result<Value, ApiError> {
        self.check("update_document_metadata")?;
        self.metadata
            .lock()
            .unwrap()
            .insert(document_id.to_string(), metadata.clone());
        Ok(metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_answers_in_order() {
        let mock = MockTransport::new();
        mock.queue_answer("first");
        mock.queue_error(ApiError::network("down"));

        let request = ContinueRequest::new("q", &Settings::default());
        let first = mock.continue_conversation("c1", &request).await.unwrap();
        assert_eq!(first.response, "first");
        assert!(mock.continue_conversation("c1", &request).await.is_err());

        // Nothing left queued
        let result = mock.continue_conversation("c1", &request).await;
        assert_eq!(result.unwrap_err().message, "No mock response queued");
        assert_eq!(mock.recorded_questions(), vec!["q", "q", "q"]);
    }

    #[tokio::test]
    async fn test_mock_failure_is_consumed() {
        let mock = MockTransport::new();
        mock.fail_next("list_documents", ApiError::network("down"));
        assert!(mock.list_documents().await.is_err());
        assert!(mock.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logging_transport_passes_through() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_conversation("c-42");
        let logged = LoggingTransport::new(mock.clone());

        let created = logged.create_conversation().await.unwrap();
        assert_eq!(created.conversation_id, "c-42");

        let err = logged.create_conversation().await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Network);
    }
}
