//! In-memory state repository
//!
//! Mirrors the Redis implementation's TTL and merge semantics for tests and
//! single-process runs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{ProcessedRequest, StatePatch};

use super::{decode_record, encode_record, merge_record, state_key, StateError, StateRepository};

struct StoredEntry {
    payload: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// HashMap-backed twin of the Redis state repository
pub struct InMemoryStateRepository {
    entries: Mutex<HashMap<String, StoredEntry>>,
    default_ttl: Duration,
}

impl InMemoryStateRepository {
    /// Create a store with the default one-week TTL
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(7 * 24 * 60 * 60))
    }

    /// Create a store with a custom TTL
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Remaining lifetime of a record, when it exists and hasn't expired
    pub fn ttl_remaining(&self, request_id: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        let entry = entries.get(&state_key(request_id))?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.payload.clone())
    }
}

impl Default for InMemoryStateRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn create(
        &self,
        request_id: &str,
        record: &ProcessedRequest,
    ) -> Result<ProcessedRequest, StateError> {
        let payload = encode_record(record)?;
        self.entries.lock().insert(
            state_key(request_id),
            StoredEntry {
                payload,
                expires_at: Instant::now() + self.default_ttl,
            },
        );
        Ok(record.clone())
    }

    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StateError> {
        match self.read_raw(&state_key(request_id)) {
            Some(payload) => Ok(Some(decode_record(&payload)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        request_id: &str,
        patch: &StatePatch,
    ) -> Result<Option<ProcessedRequest>, StateError> {
        let key = state_key(request_id);
        let stored = match self.read_raw(&key) {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let (payload, record) = merge_record(&stored, patch)?;

        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            // The remaining TTL is preserved: only the payload changes.
            Some(entry) if !entry.is_expired() => entry.payload = payload,
            _ => {
                entries.insert(
                    key,
                    StoredEntry {
                        payload,
                        expires_at: Instant::now() + self.default_ttl,
                    },
                );
            }
        }
        Ok(Some(record))
    }

    async fn delete(&self, request_id: &str) -> Result<bool, StateError> {
        Ok(self.entries.lock().remove(&state_key(request_id)).is_some())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
