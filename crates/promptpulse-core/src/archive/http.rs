//! HTTP client for the archive service

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServiceEndpoint;
use crate::domain::HistoryRecord;

use super::{ArchiveError, ArchiveGateway, HistoryQuery};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled HTTP client for the archive service
pub struct HttpArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveClient {
    /// Create a client for the configured endpoint
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, ArchiveError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ArchiveError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: endpoint.base_url(),
        })
    }
}

#[async_trait]
impl ArchiveGateway for HttpArchiveClient {
    async fn create_history(&self, record: &HistoryRecord) -> Result<HistoryRecord, ArchiveError> {
        let response = self
            .client
            .post(format!("{}/history", self.base_url))
            .json(record)
            .send()
            .await
            .map_err(|e| ArchiveError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 | 201 => response
                .json()
                .await
                .map_err(|e| ArchiveError::Serialization(e.to_string())),
            409 => Err(ArchiveError::Conflict {
                request_id: record.request_id.clone(),
            }),
            status => Err(ArchiveError::Service {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, ArchiveError> {
        let mut request = self
            .client
            .get(format!("{}/history", self.base_url))
            .query(&[("limit", query.limit), ("offset", query.offset)]);
        if let Some(status) = query.status {
            request = request.query(&[("status", status.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ArchiveError::Service {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ArchiveError::Serialization(e.to_string()))
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<HistoryRecord>, ArchiveError> {
        let response = self
            .client
            .get(format!("{}/history/{request_id}", self.base_url))
            .send()
            .await
            .map_err(|e| ArchiveError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json()
                .await
                .map(Some)
                .map_err(|e| ArchiveError::Serialization(e.to_string())),
            404 => Ok(None),
            status => Err(ArchiveError::Service {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}
