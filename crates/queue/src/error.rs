use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid message: {0}")]
    Validation(String),
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("\"{0}\" message not found!")]
    NotFound(i64),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for QueueError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::Payload(a), Self::Payload(b)) => a.to_string() == b.to_string(),
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
