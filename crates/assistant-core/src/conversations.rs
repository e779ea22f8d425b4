//! Bounded local history of conversations
//!
//! The whole collection lives under one key, most recently saved first and
//! capped at [`MAX_CONVERSATIONS`]. Each call reads the collection, applies one
//! change and writes the collection back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::state::ChatRole;
use crate::storage::StorageBackend;

pub const CONVERSATIONS_KEY: &str = "ai-research-assistant-conversations";
pub const MAX_CONVERSATIONS: usize = 50;
pub const TITLE_MAX_CHARS: usize = 30;

/// One persisted turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Records written before messages carried ids load with an empty one.
    #[serde(default)]
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title for a conversation from its first user message
pub fn derive_title(first_message: &str) -> String {
    let cleaned = first_message.replace('\n', " ");
    let cleaned = cleaned.trim();

    match cleaned.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &cleaned[..cut]),
        None => cleaned.to_string(),
    }
}

pub struct ConversationStore<B> {
    backend: B,
}

impl<B: StorageBackend> ConversationStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Stored conversations, most recently saved first.
    ///
    /// Missing, unreadable or malformed data reads as an empty history.
    pub fn read_all(&self) -> Vec<Conversation> {
        let raw = match self.backend.get(CONVERSATIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read conversation history");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding corrupt conversation history");
            Vec::new()
        })
    }

    /// Insert or replace by id, then trim to capacity.
    ///
    /// A known id keeps its position; a new one goes to the front.
    pub fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut conversations = self.read_all();
        let mut conversation = conversation.clone();
        conversation.updated_at = Utc::now();

        match conversations.iter().position(|c| c.id == conversation.id) {
            Some(index) => conversations[index] = conversation,
            None => conversations.insert(0, conversation),
        }

        if conversations.len() > MAX_CONVERSATIONS {
            tracing::info!(
                dropped = conversations.len() - MAX_CONVERSATIONS,
                "evicting oldest conversations"
            );
            conversations.truncate(MAX_CONVERSATIONS);
        }

        self.write_all(&conversations)
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.read_all().into_iter().find(|c| c.id == id)
    }

    /// Remove by id; a missing id leaves the history untouched.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let conversations: Vec<Conversation> = self
            .read_all()
            .into_iter()
            .filter(|c| c.id != id)
            .collect();
        self.write_all(&conversations)
    }

    pub fn clear_all(&self) -> StoreResult<()> {
        tracing::info!("clearing conversation history");
        self.backend.remove(CONVERSATIONS_KEY)
    }

    fn write_all(&self, conversations: &[Conversation]) -> StoreResult<()> {
        let json = serde_json::to_string(conversations)?;
        self.backend.set(CONVERSATIONS_KEY, &json)
    }
}
