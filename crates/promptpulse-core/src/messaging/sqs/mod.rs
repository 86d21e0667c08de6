//! SQS-backed consumer runtime (the `cloud_pubsub` receive side)
//!
//! Three cooperating pieces: a long-polling [`SqsPoller`], a background
//! [`VisibilityExtender`] that keeps long-running messages invisible to
//! other consumers, and the [`SqsConsumer`] that dispatches parsed messages
//! into the bounded handler pool and finalizes them - delete on success,
//! release for redelivery on failure.

mod client;
mod consumer;
mod extender;
mod parser;
mod poller;

pub use client::{QueueApi, QueueApiError, RawQueueMessage, SqsQueueClient};
pub use consumer::SqsConsumer;
pub use extender::{AlreadyRegistered, VisibilityExtender};
pub use parser::parse_batch;
pub use poller::SqsPoller;
