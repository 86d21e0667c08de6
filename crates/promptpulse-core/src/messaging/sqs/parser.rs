//! Tolerant queue envelope parsing
//!
//! Queue bodies arrive in one of two shapes: the SNS fan-out wrapper, where
//! the body is JSON whose `Message` field is the payload as a nested JSON
//! *string*, or a direct JSON payload. Individual malformed messages are
//! skipped with a warning; one bad item never aborts its batch.

use super::RawQueueMessage;
use crate::messaging::ParsedMessage;

/// Parse a received batch, dropping items that cannot be decoded
pub fn parse_batch(messages: Vec<RawQueueMessage>) -> Vec<ParsedMessage> {
    messages
        .into_iter()
        .filter_map(|message| match parse_message(message) {
            Ok(parsed) => Some(parsed),
            Err(reason) => {
                tracing::warn!(reason = %reason, "Skipping queue message");
                None
            }
        })
        .collect()
}

fn parse_message(message: RawQueueMessage) -> Result<ParsedMessage, String> {
    let body = message.body.ok_or("'Body' is missing")?;

    let body: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| format!("body is not JSON: {e}"))?;

    let (contents, attributes) = match body.get("Message") {
        Some(inner) => {
            // SNS wrapper: the payload is a JSON string inside the body.
            let inner = inner
                .as_str()
                .ok_or("'Message' field is not a string")?;
            let contents: serde_json::Value = serde_json::from_str(inner)
                .map_err(|e| format!("'Message' field is not JSON: {e}"))?;
            let attributes = body.get("MessageAttributes").cloned();
            (contents, attributes)
        }
        None => (body, message.attributes),
    };

    Ok(ParsedMessage {
        message_id: message.message_id.unwrap_or_default(),
        receipt_handle: message.receipt_handle,
        contents,
        attributes,
    })
}
