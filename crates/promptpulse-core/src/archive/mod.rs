//! Durable archive gateway
//!
//! The archive service owns the relational `request_history` table: one row
//! per request, unique on `request_id`, written when a request reaches a
//! terminal stage and never deleted. Idempotency under redelivery leans on
//! that unique index - a duplicate insert surfaces as [`ArchiveError::Conflict`]
//! and callers on the success path treat it as already-done. The archive is
//! never read on the hot path.

mod http;
mod memory;

use async_trait::async_trait;

pub use http::HttpArchiveClient;
pub use memory::InMemoryArchive;

use crate::domain::{HistoryRecord, RequestStage};

/// Errors from the archive service
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    /// A row with this `request_id` already exists
    #[error("archive row for request {request_id} already exists")]
    Conflict {
        /// The duplicated request id
        request_id: String,
    },

    /// The service answered with an unexpected status
    #[error("archive service returned {status}: {body}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body, for the log line
        body: String,
    },

    /// The service could not be reached
    #[error("archive transport error: {0}")]
    Transport(String),

    /// A payload could not be encoded or decoded
    #[error("archive serialization error: {0}")]
    Serialization(String),
}

/// Pagination and filtering for archive reads
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Maximum rows returned
    pub limit: usize,
    /// Rows skipped from the newest end
    pub offset: usize,
    /// Restrict to one terminal status
    pub status: Option<RequestStage>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            status: None,
        }
    }
}

/// Write/read access to the durable archive
#[async_trait]
pub trait ArchiveGateway: Send + Sync {
    /// Insert a row; duplicates surface as [`ArchiveError::Conflict`]
    async fn create_history(&self, record: &HistoryRecord) -> Result<HistoryRecord, ArchiveError>;

    /// Page through rows, newest first
    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, ArchiveError>;

    /// Look up one row by request id
    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<HistoryRecord>, ArchiveError>;

    /// Whether the service answers its health probe
    async fn is_healthy(&self) -> bool;
}
