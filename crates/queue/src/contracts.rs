//! Message contracts carried by the three pipeline queues.
//!
//! Every message is validated twice: before it is written by [`publish`] and
//! again after the consumer decodes it.
//!
//! [`publish`]: crate::publish

use api_types::TransactionType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::QueueError;

pub const EXTRACTION_QUEUE: &str = "transaction-extractor";
pub const RESULT_QUEUE: &str = "transaction-extractor-result";
pub const BUDGET_UPDATE_QUEUE: &str = "budget-update";

pub const DEFAULT_CURRENCY: &str = "THB";

/// A payload bound to one named queue.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const QUEUE: &'static str;

    fn validate(&self) -> Result<(), QueueError>;
}

fn require_text(value: &str, field: &str) -> Result<(), QueueError> {
    if value.trim().is_empty() {
        return Err(QueueError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_optional_text(value: Option<&str>, field: &str) -> Result<(), QueueError> {
    match value {
        Some(value) => require_text(value, field),
        None => Ok(()),
    }
}

/// Parse the date string produced by the model.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (or space separated)
/// timestamp and a bare `YYYY-MM-DD` date. Naive values are read as UTC.
pub fn parse_transaction_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction job
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobImage {
    /// Base64 of the raw image bytes.
    pub content: String,
    pub mime_type: String,
    pub name: String,
    pub ext: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub images: Vec<JobImage>,
    pub user_id: String,
}

impl Message for ExtractionJob {
    const QUEUE: &'static str = EXTRACTION_QUEUE;

    fn validate(&self) -> Result<(), QueueError> {
        require_text(&self.user_id, "userId")?;
        if self.images.is_empty() {
            return Err(QueueError::Validation(
                "at least one image is required".to_string(),
            ));
        }
        for image in &self.images {
            require_text(&image.content, "image content")?;
            STANDARD.decode(&image.content).map_err(|err| {
                QueueError::Validation(format!("image {} is not base64: {err}", image.name))
            })?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction result
// ─────────────────────────────────────────────────────────────────────────────

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// One transaction read off a receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTransaction {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub name: String,
    pub source: Option<String>,
    pub bank_name: Option<String>,
    pub receiver: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub notes: Option<String>,
    pub transaction_date: String,
    /// Category slug, `None` when the model could not pick one.
    pub category: Option<String>,
}

impl ExtractedTransaction {
    pub fn validate(&self) -> Result<(), QueueError> {
        require_text(&self.name, "name")?;
        require_text(&self.currency, "currency")?;
        require_optional_text(self.source.as_deref(), "source")?;
        require_optional_text(self.bank_name.as_deref(), "bankName")?;
        require_optional_text(self.receiver.as_deref(), "receiver")?;
        require_optional_text(self.category.as_deref(), "category")?;
        self.occurred_at().map(|_| ())
    }

    pub fn occurred_at(&self) -> Result<DateTime<Utc>, QueueError> {
        parse_transaction_date(&self.transaction_date).ok_or_else(|| {
            QueueError::Validation(format!(
                "invalid transactionDate: {}",
                self.transaction_date
            ))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub user_id: String,
    pub batch_id: String,
    pub transactions: Vec<ExtractedTransaction>,
}

impl Message for ExtractionResult {
    const QUEUE: &'static str = RESULT_QUEUE;

    fn validate(&self) -> Result<(), QueueError> {
        require_text(&self.user_id, "userId")?;
        require_text(&self.batch_id, "batchId")?;
        for transaction in &self.transactions {
            transaction.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Budget update
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetAction {
    #[default]
    Add,
    Subtract,
}

/// Adjust the budgets of `category_id` by the amount of transaction `uid`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUpdate {
    pub uid: String,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub action_type: BudgetAction,
}

impl Message for BudgetUpdate {
    const QUEUE: &'static str = BUDGET_UPDATE_QUEUE;

    fn validate(&self) -> Result<(), QueueError> {
        require_text(&self.uid, "uid")?;
        require_text(&self.user_id, "userId")
    }
}
