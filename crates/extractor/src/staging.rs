use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use queue::ExtractionJob;
use storage::{ObjectStore, staging};
use tracing::info;
use uuid::Uuid;

use crate::ResultExtract;

/// Where a job's images were written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedBatch {
    pub batch_id: String,
    pub prefix: String,
    pub keys: Vec<String>,
}

/// Writes job images to `transactions/{user_id}/{batch_id}/{image_id}.{ext}`.
#[derive(Clone)]
pub struct Stager {
    store: Arc<dyn ObjectStore>,
}

impl Stager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Stage every image under a fresh batch id. Stops at the first failed
    /// write; objects already written stay where they are.
    pub async fn stage(&self, job: &ExtractionJob) -> ResultExtract<StagedBatch> {
        let batch_id = Uuid::now_v7().to_string();
        let prefix = staging::batch_prefix(&job.user_id, &batch_id)?;

        let mut keys = Vec::with_capacity(job.images.len());
        for image in &job.images {
            let bytes = STANDARD.decode(&image.content)?;
            let image_id = Uuid::now_v7().to_string();
            let key = staging::image_key(&job.user_id, &batch_id, &image_id, &image.ext)?;
            self.store.put(&key, bytes, &image.mime_type).await?;
            keys.push(key);
        }

        info!(user_id = %job.user_id, batch_id, images = keys.len(), "batch staged");
        Ok(StagedBatch {
            batch_id,
            prefix,
            keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue::JobImage;
    use storage::MemoryStore;

    fn image(bytes: &[u8], ext: &str) -> JobImage {
        JobImage {
            content: STANDARD.encode(bytes),
            mime_type: "image/png".to_string(),
            name: "slip".to_string(),
            ext: ext.to_string(),
        }
    }

    #[tokio::test]
    async fn writes_every_image_under_one_batch() {
        let store = Arc::new(MemoryStore::new());
        let stager = Stager::new(store.clone());
        let job = ExtractionJob {
            images: vec![image(b"one", "png"), image(b"two", "png")],
            user_id: "alice".to_string(),
        };

        let batch = stager.stage(&job).await.unwrap();
        assert_eq!(batch.keys.len(), 2);
        assert_eq!(batch.prefix, format!("transactions/alice/{}", batch.batch_id));
        assert!(batch.keys.iter().all(|key| key.starts_with(&batch.prefix)));

        let object = store.get(&batch.keys[1]).await.unwrap();
        assert_eq!(object.bytes, b"two");
        assert_eq!(object.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn first_failure_keeps_earlier_objects() {
        let store = Arc::new(MemoryStore::new());
        let stager = Stager::new(store.clone());
        let mut broken = image(b"two", "png");
        broken.content = "not base64!".to_string();
        let job = ExtractionJob {
            images: vec![image(b"one", "png"), broken, image(b"three", "png")],
            user_id: "alice".to_string(),
        };

        assert!(stager.stage(&job).await.is_err());
        assert_eq!(store.len().await, 1);
    }
}
