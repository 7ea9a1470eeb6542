//! Error types for the Telegram adapter.

use thiserror::Error;

use ticketdesk_core::{BlobError, ConfigError};
use ticketdesk_persistence::PersistenceError;

/// Errors that can occur while starting or running the bots.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;
