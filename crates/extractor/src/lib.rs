//! Receipt extraction: turn uploads into jobs, stage the images, ask a
//! vision-language model for the transactions and publish what it found.

pub use error::ExtractError;
pub use gemini::{GeminiConfig, GeminiModel};
pub use job::{Upload, build_job, sniff};
pub use model::{ReceiptImage, ReceiptModel};
pub use output::parse_output;
pub use staging::{StagedBatch, Stager};
pub use worker::ExtractionWorker;

mod error;
mod gemini;
mod job;
mod model;
mod output;
pub mod prompt;
mod staging;
mod worker;

pub type ResultExtract<T> = Result<T, ExtractError>;
