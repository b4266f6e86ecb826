use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogDrainError>;

#[derive(Debug, Error)]
pub enum LogDrainError {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
