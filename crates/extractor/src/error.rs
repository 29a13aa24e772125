use queue::QueueError;
use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid upload: {0}")]
    InvalidInput(String),
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    #[error("Model request failed: {0}")]
    Model(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
