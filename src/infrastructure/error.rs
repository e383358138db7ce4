use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("data service error: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("awaiting provider confirmation: {0}")]
    PendingConfirmation(String),
    #[error("state error: {0}")]
    State(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
