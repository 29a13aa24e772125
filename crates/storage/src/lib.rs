//! Object storage used to stage receipt images between upload and extraction.
//!
//! Keys are `/`-separated relative paths. A prefix passed to [`ObjectStore::list`]
//! or [`ObjectStore::delete_prefix`] names a directory: `a/b` matches `a/b/c`
//! but never `a/bc`.

use async_trait::async_trait;

pub use error::StorageError;
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

mod error;
mod filesystem;
mod memory;
pub mod staging;

pub type ResultStorage<T> = Result<T, StorageError>;

/// A stored blob and the content type it was written with, when the backend
/// keeps one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ResultStorage<()>;

    async fn get(&self, key: &str) -> ResultStorage<Object>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> ResultStorage<Vec<String>>;

    /// Delete one object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> ResultStorage<()>;

    /// Delete every object under `prefix` and return how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> ResultStorage<usize> {
        let keys = self.list(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }
}

/// Check a key or prefix and return it without surrounding slashes.
pub(crate) fn normalize_key(key: &str) -> ResultStorage<&str> {
    let trimmed = key.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let bad_segment = trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad_segment || trimmed.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(trimmed)
}
