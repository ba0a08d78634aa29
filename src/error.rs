//! Error types for mailq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("submission queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("dispatcher is closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
