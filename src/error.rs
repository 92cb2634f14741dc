//! Error types for the lot-size bot

use thiserror::Error;

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Error, Debug)]
pub enum BotError {

    // =============================
    // Core Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Telegram API error: {0}")]
    TelegramApi(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Conversation state is missing '{0}'")]
    IncompleteState(&'static str),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
