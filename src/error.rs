//! Error handling for the chat hub

use std::fmt;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat hub error types
#[derive(Debug, Clone)]
pub enum ChatError {
    /// Socket read/write failures
    Network(String),
    /// JSON encoding/decoding errors
    Serialization(String),
    /// Malformed frames: missing delimiter, unknown command token
    Protocol(String),
    /// A request that decoded fine but failed validation
    InvalidMessage(String),
    /// Referenced identity is not in the registry
    UserNotFound(String),
    /// Persistence backend failure
    Storage(String),
    /// Configuration error
    Config(String),
    /// Size or capacity limit exceeded
    ResourceLimit(String),
    /// Hub internal error (closed channels, panicked tasks)
    Internal(String),
}

impl ChatError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            ChatError::Network(_) => 1000,
            ChatError::Serialization(_) => 1001,
            ChatError::Protocol(_) => 1003,
            ChatError::InvalidMessage(_) => 1005,
            ChatError::UserNotFound(_) => 1006,
            ChatError::Storage(_) => 1007,
            ChatError::Internal(_) => 1009,
            ChatError::Config(_) => 1010,
            ChatError::ResourceLimit(_) => 1012,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            ChatError::Network(msg) => msg,
            ChatError::Serialization(msg) => msg,
            ChatError::Protocol(msg) => msg,
            ChatError::InvalidMessage(msg) => msg,
            ChatError::UserNotFound(msg) => msg,
            ChatError::Storage(msg) => msg,
            ChatError::Config(msg) => msg,
            ChatError::ResourceLimit(msg) => msg,
            ChatError::Internal(msg) => msg,
        }
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        ChatError::Network(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ChatError::Serialization(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        ChatError::Protocol(msg.into())
    }

    /// Create an invalid message error
    pub fn invalid_message<T: Into<String>>(msg: T) -> Self {
        ChatError::InvalidMessage(msg.into())
    }

    /// Create a user not found error
    pub fn user_not_found<T: Into<String>>(msg: T) -> Self {
        ChatError::UserNotFound(msg.into())
    }

    /// Create a storage error
    pub fn storage<T: Into<String>>(msg: T) -> Self {
        ChatError::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ChatError::Config(msg.into())
    }

    /// Create a resource limit error
    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        ChatError::ResourceLimit(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ChatError::Internal(msg.into())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Network(msg) => write!(f, "Network error: {}", msg),
            ChatError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ChatError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            ChatError::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            ChatError::UserNotFound(msg) => write!(f, "User not found: {}", msg),
            ChatError::Storage(msg) => write!(f, "Storage error: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ChatError::ResourceLimit(msg) => write!(f, "Resource limit exceeded: {}", msg),
            ChatError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Storage(format!("SQLite error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Internal(format!("Task join error: {}", err))
    }
}
