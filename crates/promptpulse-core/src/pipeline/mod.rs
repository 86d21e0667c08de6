//! Pipeline workers
//!
//! The three stages of the request lifecycle: the gateway's submission
//! service (synchronous entry point), the inference handler, and the judge
//! handler. Handlers catch every failure at their top level, record it in
//! state, and report failure so the broker redelivers.

mod gateway;
mod inference;
mod judge;
mod server;

pub use gateway::{GatewayResponse, SubmissionService, SubmitError};
pub use inference::InferenceOrchestrator;
pub use judge::JudgeOrchestrator;
pub use server::{gateway_router, serve_gateway};
