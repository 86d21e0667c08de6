//! # PromptPulse Core
//!
//! Broker-backed LLM evaluation pipeline.
//!
//! A request travels `Gateway -> Inference -> Judge -> Completed` (or
//! `Failed`), coordinated across independent worker processes through a
//! message broker. Two interchangeable broker backends (SNS+SQS and Kafka)
//! share one publish/consume contract; per-request coordination state lives
//! in a short-TTL key/value store while the durable record of every finished
//! request lands in the archive service.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use promptpulse_core::config::PipelineConfig;
//! use promptpulse_core::runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_file("promptpulse.toml".as_ref())?;
//!     runtime::run_inference_worker(config).await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

/// Durable archive gateway (the record of truth for finished requests)
pub mod archive;

/// Pipeline configuration
pub mod config;

/// Request, result, message, and record types
pub mod domain;

/// Dependency health checks and the worker health endpoint
pub mod health;

/// Judge gateway client
pub mod judge;

/// Target-model provider adapters
pub mod llm;

/// Broker abstraction: publisher, consumer runtime, backends
pub mod messaging;

/// Workers: submission service, inference and judge handlers, gateway API
pub mod pipeline;

/// Worker process wiring
pub mod runtime;

/// Ephemeral per-request state store
pub mod state;

/// Graceful shutdown utilities
pub mod shutdown;

/// Structured logging setup
pub mod telemetry;

/// Re-export async_trait for downstream trait impls
pub use async_trait;
/// Re-export chrono for timestamp handling
pub use chrono;
/// Re-export serde_json for message payload handling
pub use serde_json;
/// Re-export uuid for request id generation
pub use uuid;
