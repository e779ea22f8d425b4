use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::sse::decode_stream;
use crate::state::{ChatMessage, ChatOptions, ChatResponse, ModelInfo, UploadedDocument};

/// Lazily produced assistant text. Dropping it closes the connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ClientResult<String>> + Send>>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(flatten)]
    options: &'a ChatOptions,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Client for the research assistant completion service
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Bound connection establishment only; a streamed answer may run for minutes.
    pub fn with_connect_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> ClientResult<Response> {
        if messages.is_empty() {
            return Err(ClientError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }

        let url = self.endpoint("/api/chat");
        let request = ChatRequest {
            messages,
            stream,
            options,
        };

        tracing::debug!(%url, stream, turns = messages.len(), model = ?options.model, "sending chat request");

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::debug!(status, "chat request rejected");
            return Err(ClientError::Transport { status });
        }

        Ok(response)
    }

    /// Stream the assistant reply as text fragments.
    ///
    /// Fails before producing anything when the endpoint rejects the request.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> ClientResult<FragmentStream> {
        let response = self.post_chat(messages, options, true).await?;

        if response.content_length() == Some(0) {
            return Err(ClientError::Protocol("no response body".to_string()));
        }

        Ok(Box::pin(decode_stream(Box::pin(response.bytes_stream()))))
    }

    /// Request the whole reply in one response.
    pub async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> ClientResult<ChatResponse> {
        let response = self.post_chat(messages, options, false).await?;
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("unexpected chat response: {}", e)))
    }

    /// Upload a document for analysis.
    pub async fn upload_document(
        &self,
        file_name: &str,
        content: Vec<u8>,
    ) -> ClientResult<UploadedDocument> {
        let url = self.endpoint("/api/documents/upload");
        let part = multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str(guess_content_type(file_name))?;
        let form = multipart::Form::new().part("file", part);

        tracing::debug!(%url, file_name, "uploading document");

        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Transport {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("unexpected upload response: {}", e)))
    }

    pub async fn list_models(&self) -> ClientResult<Vec<ModelInfo>> {
        let url = self.endpoint("/api/chat/models");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Transport {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        let models: ModelsResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("unexpected models response: {}", e)))?;

        Ok(models.models)
    }

    /// `true` only for a success status; any failure reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.client.get(self.endpoint("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

/// MIME type for the formats the document endpoint accepts.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
