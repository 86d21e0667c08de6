//! Redis-backed state repository

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::domain::{ProcessedRequest, StatePatch};

use super::{decode_record, encode_record, merge_record, state_key, StateError, StateRepository};

/// State records in Redis under `request:{uuid}`, expiring with a TTL
pub struct RedisStateRepository {
    connection: ConnectionManager,
    default_ttl_seconds: u64,
}

impl RedisStateRepository {
    /// Connect with a managed (auto-reconnecting) connection
    pub async fn connect(config: &RedisConfig) -> Result<Self, StateError> {
        let client =
            redis::Client::open(config.url()).map_err(|e| StateError::Backend(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            default_ttl_seconds: config.default_ttl_seconds,
        })
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, StateError> {
        let mut connection = self.connection.clone();
        connection
            .get(key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }
}

#[async_trait]
impl StateRepository for RedisStateRepository {
    async fn create(
        &self,
        request_id: &str,
        record: &ProcessedRequest,
    ) -> Result<ProcessedRequest, StateError> {
        let key = state_key(request_id);
        let payload = encode_record(record)?;

        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(&key, payload, self.default_ttl_seconds)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(record.clone())
    }

    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StateError> {
        let key = state_key(request_id);
        match self.read_raw(&key).await? {
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
        let stored = match self.read_raw(&key).await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let (payload, record) = merge_record(&stored, patch)?;

        let mut connection = self.connection.clone();
        let remaining: i64 = connection
            .ttl(&key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        let ttl_seconds = if remaining > 0 {
            remaining as u64
        } else {
            self.default_ttl_seconds
        };

        let _: () = connection
            .set_ex(&key, payload, ttl_seconds)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(Some(record))
    }

    async fn delete(&self, request_id: &str) -> Result<bool, StateError> {
        let key = state_key(request_id);
        let mut connection = self.connection.clone();
        let removed: i64 = connection
            .del(&key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn is_healthy(&self) -> bool {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .is_ok()
    }
}
