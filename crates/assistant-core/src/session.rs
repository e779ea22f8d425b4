//! In-memory conversation being built by a front end
//!
//! A session collects user and assistant turns, assembles the messages sent to
//! the completion endpoint and produces the [`Conversation`] record that the
//! history store persists after each completed exchange.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use uuid::Uuid;

use crate::conversations::{derive_title, Conversation, StoredMessage};
use crate::error::{ClientError, ClientResult};
use crate::state::{ChatMessage, ChatRole};

/// Text file sent along with a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content: String,
}

impl Attachment {
    pub const MAX_BYTES: u64 = 1024 * 1024;

    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Read a UTF-8 text file of at most [`Attachment::MAX_BYTES`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Not a file path: {:?}", path))?;

        let size = fs::metadata(path)
            .with_context(|| format!("Failed to open {:?}", path))?
            .len();
        if size > Self::MAX_BYTES {
            return Err(anyhow!(
                "{} is {} bytes; attachments are limited to {} bytes",
                file_name,
                size,
                Self::MAX_BYTES
            ));
        }

        let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| anyhow!("{} is not a UTF-8 text file", file_name))?;

        Ok(Self { file_name, content })
    }

    fn render_into(&self, text: &str) -> String {
        format!(
            "{}\n\n[Attached file: {}]\n```\n{}\n```",
            text, self.file_name, self.content
        )
    }
}

#[derive(Debug, Clone)]
struct Turn {
    message: StoredMessage,
    // Only held in memory; the history keeps the file name alone
    attachment: Option<Attachment>,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    title: Option<String>,
    created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: format!("conv_{}", Uuid::new_v4().simple()),
            title: None,
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// Continue a stored conversation; its id, title and creation time are kept.
    pub fn resume(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            title: Some(conversation.title),
            created_at: conversation.created_at,
            turns: conversation
                .messages
                .into_iter()
                .map(|message| Turn {
                    message,
                    attachment: None,
                })
                .collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>, attachment: Option<Attachment>) {
        let content = content.into();
        if self.title.is_none() {
            self.title = Some(derive_title(&content));
        }

        let file_name = attachment.as_ref().map(|a| a.file_name.clone());
        self.push(ChatRole::User, content, file_name, attachment);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatRole::Assistant, content.into(), None, None);
    }

    fn push(
        &mut self,
        role: ChatRole,
        content: String,
        file_name: Option<String>,
        attachment: Option<Attachment>,
    ) {
        self.turns.push(Turn {
            message: StoredMessage {
                id: Uuid::new_v4().to_string(),
                role,
                content,
                timestamp: Utc::now(),
                file_name,
            },
            attachment,
        });
    }

    /// Messages for the completion endpoint: instruction prefix, then every turn.
    pub fn request_messages(&self, system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);

        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }

        for turn in &self.turns {
            let content = match &turn.attachment {
                Some(attachment) => attachment.render_into(&turn.message.content),
                None => turn.message.content.clone(),
            };
            messages.push(ChatMessage::new(turn.message.role, content));
        }

        messages
    }

    /// At least one full exchange has happened.
    pub fn is_persistable(&self) -> bool {
        let has = |role: ChatRole| self.turns.iter().any(|t| t.message.role == role);
        has(ChatRole::User) && has(ChatRole::Assistant)
    }

    pub fn to_conversation(&self) -> Conversation {
        Conversation {
            id: self.id.clone(),
            title: self.title.clone().unwrap_or_default(),
            messages: self.turns.iter().map(|t| t.message.clone()).collect(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// A stream that failed after producing some text
#[derive(Debug, Error)]
#[error("response interrupted: {error}")]
pub struct PartialResponse {
    /// Text received before the failure; owned by the caller
    pub text: String,
    #[source]
    pub error: ClientError,
}

/// Drain a fragment stream, handing each fragment to `on_fragment`.
pub async fn collect_stream<S, F>(mut stream: S, mut on_fragment: F) -> Result<String, PartialResponse>
where
    S: Stream<Item = ClientResult<String>> + Unpin,
    F: FnMut(&str),
{
    let mut text = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                on_fragment(&fragment);
                text.push_str(&fragment);
            }
            Err(error) => return Err(PartialResponse { text, error }),
        }
    }

    Ok(text)
}
