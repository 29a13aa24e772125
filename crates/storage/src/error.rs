use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid object key: \"{0}\"")]
    InvalidKey(String),
    #[error("\"{0}\" object not found!")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PartialEq for StorageError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidKey(a), Self::InvalidKey(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
