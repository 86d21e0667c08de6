//! In-memory archive
//!
//! Test twin of the archive service, including the unique-index behavior
//! the judge handler's idempotency depends on.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::HistoryRecord;

use super::{ArchiveError, ArchiveGateway, HistoryQuery};

/// Vec-backed archive with a unique `request_id` constraint
#[derive(Default)]
pub struct InMemoryArchive {
    rows: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// Snapshot of every stored row
    pub fn rows(&self) -> Vec<HistoryRecord> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl ArchiveGateway for InMemoryArchive {
    async fn create_history(&self, record: &HistoryRecord) -> Result<HistoryRecord, ArchiveError> {
        let mut rows = self.rows.lock();
        if rows.iter().any(|row| row.request_id == record.request_id) {
            return Err(ArchiveError::Conflict {
                request_id: record.request_id.clone(),
            });
        }
        rows.push(record.clone());
        Ok(record.clone())
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, ArchiveError> {
        let mut rows: Vec<HistoryRecord> = self
            .rows
            .lock()
            .iter()
            .filter(|row| query.status.map(|s| row.status == s).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<HistoryRecord>, ArchiveError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|row| row.request_id == request_id)
            .cloned())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
