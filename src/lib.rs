//! # PromptPulse
//!
//! **Broker-backed LLM evaluation pipeline**
//!
//! Submit a prompt with a target model and a judge model; PromptPulse runs
//! the inference, has the judge score the response, and archives the full
//! record. Requests move `Gateway -> Inference -> Judge -> Completed` (or
//! `Failed`) across independent worker processes coordinated through a
//! message broker - SNS+SQS or Kafka behind one publish/consume contract.
//!
//! ## Processes
//!
//! ```text
//! promptpulse gateway            # submission API
//! promptpulse inference-worker   # consumes inference topic, calls the target model
//! promptpulse judge-worker       # consumes judge topic, scores and archives
//! ```
//!
//! See `promptpulse-core` for the broker abstraction, consumer runtime, and
//! worker implementations.

// Re-export everything from promptpulse-core
pub use promptpulse_core::*;
