use thiserror::Error;

/// Failures of a request against the completion service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The endpoint answered with a non-success status.
    #[error("API error: {status}")]
    Transport { status: u16 },

    /// The connection failed or dropped mid-response.
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Bad status and connection failures; callers fall back on these.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. } | ClientError::Connection(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status } => Some(*status),
            ClientError::Connection(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failures writing to a storage backend. Corrupt data on read is never an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
pub type StoreResult<T> = Result<T, StoreError>;
