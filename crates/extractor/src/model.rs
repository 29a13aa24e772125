use async_trait::async_trait;

use crate::ResultExtract;

/// An image handed to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A vision-language model that reads receipts.
///
/// Implementations return the raw JSON text the model produced; checking it
/// is left to [`parse_output`](crate::parse_output).
#[async_trait]
pub trait ReceiptModel: Send + Sync {
    async fn extract(&self, images: &[ReceiptImage]) -> ResultExtract<String>;
}
