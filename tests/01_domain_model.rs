//! tests/01_domain_model.rs
//!
//! Stage machine and serialization laws for the domain types.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use promptpulse::domain::{
    ApiKey, GatewayRequest, HistoryRecord, InferenceResult, JudgeModel, JudgeResult,
    ProcessedRequest, RequestStage, StatePatch, TargetModel,
};
use proptest::prelude::*;

fn request(prompt: &str) -> GatewayRequest {
    GatewayRequest {
        prompt: prompt.to_string(),
        target_model: TargetModel {
            name: "ChatGPT".into(),
        },
        api_key: ApiKey::new("sk-T"),
        judge_model: JudgeModel {
            name: "qwen2.5".into(),
            version: "latest".into(),
        },
    }
}

#[test]
fn stage_machine_is_forward_only() {
    use RequestStage::*;

    let forward = [(Gateway, Inference), (Inference, Judge), (Judge, Completed)];
    for (from, to) in forward {
        assert!(from.can_transition_to(to), "{from} -> {to}");
        assert!(!to.can_transition_to(from), "{to} -> {from} must not hold");
    }

    for stage in [Gateway, Inference, Judge] {
        assert!(stage.can_transition_to(Failed), "{stage} -> Failed");
    }

    for terminal in [Completed, Failed] {
        assert!(terminal.is_terminal());
        for next in [Gateway, Inference, Judge, Completed, Failed] {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

#[test]
fn stage_serializes_to_wire_names() {
    for (stage, wire) in [
        (RequestStage::Gateway, "\"Gateway\""),
        (RequestStage::Inference, "\"Inference\""),
        (RequestStage::Judge, "\"Judge\""),
        (RequestStage::Completed, "\"Completed\""),
        (RequestStage::Failed, "\"Failed\""),
    ] {
        assert_eq!(serde_json::to_string(&stage).unwrap(), wire);
    }
}

#[test]
fn api_key_is_redacted_in_debug_but_present_on_the_wire() {
    let request = request("What is 2+2?");

    let debug = format!("{request:?}");
    assert!(!debug.contains("sk-T"));

    let wire = serde_json::to_string(&request).unwrap();
    assert!(wire.contains("\"api_key\":\"sk-T\""));
}

#[test]
fn state_patch_only_carries_set_fields() {
    let patch = StatePatch::failed("Rate limit exceeded");
    let value = serde_json::to_value(&patch).unwrap();
    let object = value.as_object().unwrap();

    assert_eq!(object.len(), 2);
    assert_eq!(object["stage"], "Failed");
    assert_eq!(object["error_message"], "Rate limit exceeded");
}

#[test]
fn history_record_never_leaks_the_api_key() {
    let mut record = ProcessedRequest::new("r-1", request("What is 2+2?"));
    record.stage = RequestStage::Completed;

    let row = HistoryRecord::from_state(&record);
    let wire = serde_json::to_string(&row).unwrap();
    assert!(!wire.contains("sk-T"));
}

fn millis(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).unwrap()
}

prop_compose! {
    fn arb_inference_result()(
        response in ".{0,64}",
        latency in 0.0f64..60_000.0,
        tokens in proptest::option::of(0u32..100_000),
    ) -> InferenceResult {
        InferenceResult {
            response,
            model: "gpt-4o-mini".into(),
            latency_ms: latency,
            prompt_tokens: tokens,
            completion_tokens: tokens,
            total_tokens: tokens,
        }
    }
}

prop_compose! {
    fn arb_judge_result()(
        score in 0.0f64..=1.0,
        reasoning in ".{0,64}",
        relevance in 0.0f64..=1.0,
    ) -> JudgeResult {
        let mut categories = HashMap::new();
        categories.insert("relevance".to_string(), serde_json::json!(relevance));
        JudgeResult {
            score,
            reasoning,
            categories: Some(categories),
            model: "qwen2.5:latest".into(),
            latency_ms: 200.0,
        }
    }
}

prop_compose! {
    fn arb_record()(
        prompt in ".{1,64}",
        stage in prop_oneof![
            Just(RequestStage::Gateway),
            Just(RequestStage::Inference),
            Just(RequestStage::Judge),
            Just(RequestStage::Completed),
            Just(RequestStage::Failed),
        ],
        inference in proptest::option::of(arb_inference_result()),
        judge in proptest::option::of(arb_judge_result()),
        error in proptest::option::of(".{1,32}"),
        created_ms in 1_600_000_000_000i64..1_900_000_000_000,
        updated_delta_ms in 0i64..86_400_000,
    ) -> ProcessedRequest {
        let mut record = ProcessedRequest::new("00000000-0000-4000-8000-000000000000", request(&prompt));
        record.stage = stage;
        record.inference_result = inference;
        record.judge_result = judge;
        record.error_message = error;
        record.created_at = millis(created_ms);
        record.updated_at = millis(created_ms + updated_delta_ms);
        record
    }
}

proptest! {
    // Serialize -> deserialize -> identical record (timestamps are stored at
    // millisecond precision, so equality is exact).
    #[test]
    fn processed_request_round_trips(record in arb_record()) {
        let wire = serde_json::to_string(&record).unwrap();
        let parsed: ProcessedRequest = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(parsed, record);
    }

    #[test]
    fn history_row_round_trips(record in arb_record()) {
        let row = HistoryRecord::from_state(&record);
        let wire = serde_json::to_string(&row).unwrap();
        let parsed: HistoryRecord = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(parsed.request_id, row.request_id);
        prop_assert_eq!(parsed.judge_score, row.judge_score);
        prop_assert_eq!(parsed.inference_tokens, row.inference_tokens);
        prop_assert_eq!(parsed.created_at, row.created_at);
    }
}
