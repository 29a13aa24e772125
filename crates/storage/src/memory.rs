use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Object, ObjectStore, ResultStorage, StorageError, normalize_key};

/// Process-local store for tests and single-process development setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Object>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ResultStorage<()> {
        let key = normalize_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            Object {
                bytes,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> ResultStorage<Object> {
        let key = normalize_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> ResultStorage<Vec<String>> {
        let dir = format!("{}/", normalize_key(prefix)?);
        let objects = self.objects.read().await;
        Ok(objects
            .range(dir.clone()..)
            .take_while(|(key, _)| key.starts_with(&dir))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> ResultStorage<()> {
        let key = normalize_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}
