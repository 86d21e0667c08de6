//! Domain types for the evaluation pipeline
//!
//! Everything that crosses a process boundary lives here: the submission
//! payload, the per-stage results, the broker message envelopes, the
//! ephemeral state record, and the flattened archive row. All of it is
//! serde-serializable JSON; broker payloads are self-contained so a worker
//! never has to read state before handling a message.

mod history;
mod message;
mod record;
mod request;
mod result;
mod stage;

pub use history::HistoryRecord;
pub use message::{InferenceMessage, JudgeMessage, TOPIC_INFERENCE, TOPIC_JUDGE};
pub use record::{ProcessedRequest, StatePatch};
pub use request::{ApiKey, GatewayRequest, JudgeModel, TargetModel};
pub use result::{InferenceResult, JudgeResult};
pub use stage::{RequestStage, RequestStatus};
