//! tests/02_envelope_parsing.rs
//!
//! Queue envelope laws: wrapped and direct bodies decode to the same
//! contents, and one bad message never poisons its batch.

use promptpulse::messaging::sqs::{parse_batch, RawQueueMessage};

fn raw(id: &str, body: impl Into<String>) -> RawQueueMessage {
    RawQueueMessage {
        message_id: Some(id.to_string()),
        receipt_handle: Some(format!("rh-{id}")),
        body: Some(body.into()),
        attributes: None,
    }
}

#[test]
fn wrapped_envelope_parses_to_the_inner_object() {
    // The queue body as delivered through the SNS fan-out: the payload is a
    // JSON string nested inside the body's "Message" field.
    let body = "{\"Message\": \"{\\\"request_id\\\":\\\"u1\\\",\\\"topic_name\\\":\\\"inference\\\",\\\"gateway_request\\\":{\\\"prompt\\\":\\\"What is 2+2?\\\",\\\"target_model\\\":{\\\"name\\\":\\\"ChatGPT\\\"},\\\"api_key\\\":\\\"sk-T\\\",\\\"judge_model\\\":{\\\"name\\\":\\\"qwen2.5\\\",\\\"version\\\":\\\"latest\\\"}}}\"}";

    let parsed = parse_batch(vec![raw("m-1", body)]);
    assert_eq!(parsed.len(), 1);

    let contents = &parsed[0].contents;
    assert_eq!(contents["request_id"], "u1");
    assert_eq!(contents["topic_name"], "inference");
    assert_eq!(contents["gateway_request"]["prompt"], "What is 2+2?");
    assert_eq!(contents["gateway_request"]["target_model"]["name"], "ChatGPT");
}

#[test]
fn wrapped_and_direct_envelopes_are_equivalent() {
    let payload = serde_json::json!({
        "request_id": "u1",
        "topic_name": "inference",
        "gateway_request": {
            "prompt": "What is 2+2?",
            "target_model": {"name": "ChatGPT"},
            "api_key": "sk-T",
            "judge_model": {"name": "qwen2.5", "version": "latest"}
        }
    });

    let direct = raw("m-direct", payload.to_string());
    let wrapped = raw(
        "m-wrapped",
        serde_json::json!({"Message": payload.to_string()}).to_string(),
    );

    let parsed = parse_batch(vec![direct, wrapped]);
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].contents, payload);
    assert_eq!(parsed[1].contents, payload);
}

#[test]
fn mixed_batch_yields_exactly_the_valid_entries_in_order() {
    let valid_a = raw("m-1", r#"{"request_id":"u1"}"#);
    let invalid_json = raw("m-2", "{not json");
    let missing_body = RawQueueMessage {
        message_id: Some("m-3".into()),
        receipt_handle: Some("rh-3".into()),
        body: None,
        attributes: None,
    };
    let valid_b = raw("m-4", r#"{"request_id":"u2"}"#);

    let parsed = parse_batch(vec![valid_a, invalid_json, missing_body, valid_b]);

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].message_id, "m-1");
    assert_eq!(parsed[0].contents["request_id"], "u1");
    assert_eq!(parsed[1].message_id, "m-4");
    assert_eq!(parsed[1].contents["request_id"], "u2");
}

#[test]
fn receipt_handles_survive_parsing() {
    let parsed = parse_batch(vec![raw("m-1", r#"{"n":1}"#)]);
    assert_eq!(parsed[0].receipt_handle.as_deref(), Some("rh-m-1"));
}

#[test]
fn wrapped_envelope_attributes_come_from_the_body() {
    let body = serde_json::json!({
        "Message": r#"{"request_id":"u1"}"#,
        "MessageAttributes": {"source": "gateway"}
    });

    let parsed = parse_batch(vec![raw("m-1", body.to_string())]);
    assert_eq!(parsed[0].attributes.as_ref().unwrap()["source"], "gateway");
}
