pub mod client;
pub mod config;
pub mod conversations;
pub mod error;
pub mod export;
pub mod session;
pub mod settings;
pub mod sse;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use client::{ChatClient, FragmentStream};
pub use config::Config;
pub use conversations::{derive_title, Conversation, ConversationStore, StoredMessage};
pub use error::{ClientError, StoreError};
pub use export::ExportFormat;
pub use session::{collect_stream, Attachment, ChatSession, PartialResponse};
pub use settings::{Settings, SettingsPatch, SettingsStore, Theme};
pub use state::{ChatMessage, ChatOptions, ChatResponse, ChatRole, ModelInfo, Usage, UploadedDocument};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
