use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::{Object, ObjectStore, ResultStorage, StorageError, normalize_key};

/// Stores each object as a file under `root`, the key being the relative path.
///
/// Content types are not persisted; readers sniff them from the bytes.
#[derive(Clone, Debug)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ResultStorage<()> {
        let key = normalize_key(key)?;
        let full_path = self.full_path(key);
        debug!(key, content_type, size = bytes.len(), "storage: put");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // temp file + rename so readers never see a partial object
        let mut temp_path = full_path.clone().into_os_string();
        temp_path.push(".part");
        let temp_path = PathBuf::from(temp_path);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|err| {
            warn!(key, error = %err, "storage: rename failed");
            err
        })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> ResultStorage<Object> {
        let key = normalize_key(key)?;
        match fs::read(self.full_path(key)).await {
            Ok(bytes) => Ok(Object {
                bytes,
                content_type: None,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> ResultStorage<Vec<String>> {
        let dir = self.full_path(normalize_key(prefix)?);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if path.extension().is_none_or(|ext| ext != "part") {
                    keys.extend(self.key_of(&path));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> ResultStorage<()> {
        let key = normalize_key(key)?;
        match fs::remove_file(self.full_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> ResultStorage<usize> {
        let removed = self.list(prefix).await?.len();
        let dir = self.full_path(normalize_key(prefix)?);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        debug!(prefix, removed, "storage: prefix deleted");
        Ok(removed)
    }
}
