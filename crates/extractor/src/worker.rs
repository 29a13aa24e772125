use std::sync::Arc;

use async_trait::async_trait;
use queue::{ExtractionJob, ExtractionResult, Handler};
use sea_orm::DatabaseConnection;
use storage::ObjectStore;
use tracing::info;

use crate::{
    ExtractError, ReceiptImage, ReceiptModel, ResultExtract, Stager, job::sniff, parse_output,
};

/// Consumer of the extraction queue: stage, extract, publish the result.
///
/// Staged objects are never deleted here. The result consumer removes them
/// once the transactions are stored, so a failed extraction leaves its batch
/// behind.
pub struct ExtractionWorker {
    db: DatabaseConnection,
    store: Arc<dyn ObjectStore>,
    model: Arc<dyn ReceiptModel>,
}

impl ExtractionWorker {
    pub fn new(
        db: DatabaseConnection,
        store: Arc<dyn ObjectStore>,
        model: Arc<dyn ReceiptModel>,
    ) -> Self {
        Self { db, store, model }
    }

    pub async fn process(&self, job: &ExtractionJob) -> ResultExtract<ExtractionResult> {
        let batch = Stager::new(self.store.clone()).stage(job).await?;

        let keys = self.store.list(&batch.prefix).await?;
        let mut images = Vec::with_capacity(keys.len());
        for key in &keys {
            let object = self.store.get(key).await?;
            let mime_type = match object.content_type {
                Some(mime) => mime,
                None => sniff(&object.bytes, None, Some(key.as_str())).0,
            };
            images.push(ReceiptImage {
                bytes: object.bytes,
                mime_type,
            });
        }

        let raw = self.model.extract(&images).await?;
        let transactions = parse_output(&raw)?;

        let result = ExtractionResult {
            user_id: job.user_id.clone(),
            batch_id: batch.batch_id,
            transactions,
        };
        queue::publish(&self.db, &result).await?;
        info!(
            user_id = %result.user_id,
            batch_id = %result.batch_id,
            count = result.transactions.len(),
            "extraction result published"
        );
        Ok(result)
    }
}

#[async_trait]
impl Handler<ExtractionJob> for ExtractionWorker {
    type Error = ExtractError;

    async fn handle(&self, message: ExtractionJob) -> Result<(), Self::Error> {
        self.process(&message).await.map(|_| ())
    }
}
