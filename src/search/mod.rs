//! Search backend access: document shape, bulk-ingest contract, ZincSearch client.

pub mod document;
pub mod zinc;

use reqwest::StatusCode;
use thiserror::Error;

pub use document::{to_document, ConversionError, Document};
pub use zinc::ZincClient;

/// Errors that occur while talking to the search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search backend HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search backend returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode search backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outcome of one bulk-ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkResponse {
    /// Number of records the backend reports as ingested.
    pub accepted: usize,
}

/// A document store that ingests whole batches.
///
/// Shared by reference with the indexing thread, hence `Sync`. A call
/// either succeeds as a unit or fails as a unit.
pub trait SearchBackend: Sync {
    fn bulk_ingest(&self, index: &str, documents: &[Document]) -> Result<BulkResponse, SearchError>;
}
