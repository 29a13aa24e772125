//! Consumer of the extraction result queue.

use std::sync::Arc;

use async_trait::async_trait;
use engine::{Engine, EngineError};
use queue::{ExtractionResult, Handler};
use storage::{ObjectStore, StorageError, staging};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("cannot clean staged batch: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Deletes the staged images of a batch, then stores its transactions.
pub struct ResultRecorder {
    engine: Arc<Engine>,
    store: Arc<dyn ObjectStore>,
}

impl ResultRecorder {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn ObjectStore>) -> Self {
        Self { engine, store }
    }
}

#[async_trait]
impl Handler<ExtractionResult> for ResultRecorder {
    type Error = RecordError;

    async fn handle(&self, message: ExtractionResult) -> Result<(), Self::Error> {
        let prefix = staging::batch_prefix(&message.user_id, &message.batch_id)?;
        let removed = self.store.delete_prefix(&prefix).await?;
        info!(batch_id = %message.batch_id, removed, "staged batch removed");

        self.engine.record_extracted(&message).await?;
        Ok(())
    }
}
