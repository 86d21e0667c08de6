//! Gateway HTTP API
//!
//! `POST /submit` accepts a request, `GET /metadata/{request_id}` reads its
//! state record, `GET /health` answers liveness. Submission failures (state
//! or broker) surface as 5xx; the client retries and gets a fresh request
//! id.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::domain::GatewayRequest;

use super::SubmissionService;

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
        .into_response()
}

async fn submit(
    State(service): State<Arc<SubmissionService>>,
    Json(request): Json<GatewayRequest>,
) -> Response {
    match service.submit(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Submission failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn metadata(
    State(service): State<Arc<SubmissionService>>,
    Path(request_id): Path<String>,
) -> Response {
    match service.metadata(&request_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Request {request_id} not found"),
        ),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Metadata lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

/// The gateway's route table
pub fn gateway_router(service: Arc<SubmissionService>) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/metadata/:request_id", get(metadata))
        .route("/health", get(health))
        .with_state(service)
}

/// Serve the gateway API until `shutdown` resolves
pub async fn serve_gateway<F>(
    addr: SocketAddr,
    service: Arc<SubmissionService>,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Gateway API listening");
    axum::serve(listener, gateway_router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
