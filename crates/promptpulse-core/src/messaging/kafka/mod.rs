//! Kafka backend (the `log_broker` pairing)
//!
//! Produce-side delivery is confirmed within a flush timeout; consume-side
//! runs with auto-commit disabled and commits each message's offset only
//! after its handler succeeds.

mod consumer;
mod producer;

pub use consumer::KafkaConsumer;
pub use producer::KafkaPublisher;
