//! tests/05_pipeline_flow.rs
//!
//! End-to-end lifecycle scenarios over the in-memory broker: happy path,
//! inference failure, judge failure, and redelivery after a failed publish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promptpulse::archive::InMemoryArchive;
use promptpulse::domain::{
    ApiKey, GatewayRequest, InferenceResult, JudgeModel, JudgeResult, ProcessedRequest,
    RequestStage, StatePatch, TargetModel,
};
use promptpulse::judge::{JudgeError, JudgeGateway};
use promptpulse::llm::{InferenceOptions, LlmError, LlmProvider, ProviderFactory};
use promptpulse::messaging::memory::{InMemoryBroker, InMemoryConsumer};
use promptpulse::messaging::MessageConsumer;
use promptpulse::pipeline::{InferenceOrchestrator, JudgeOrchestrator, SubmissionService};
use promptpulse::state::{InMemoryStateRepository, StateError, StateRepository};

fn submission() -> GatewayRequest {
    GatewayRequest {
        prompt: "What is 2+2?".into(),
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

fn stub_inference_result() -> InferenceResult {
    InferenceResult {
        response: "2+2 equals 4.".into(),
        model: "gpt-4o-mini".into(),
        latency_ms: 150.5,
        prompt_tokens: Some(10),
        completion_tokens: Some(8),
        total_tokens: Some(18),
    }
}

fn stub_verdict() -> JudgeResult {
    let mut categories = std::collections::HashMap::new();
    for (name, score) in [
        ("relevance", 1.0),
        ("accuracy", 1.0),
        ("helpfulness", 0.9),
        ("safety", 1.0),
    ] {
        categories.insert(name.to_string(), serde_json::json!(score));
    }
    JudgeResult {
        score: 0.95,
        reasoning: "Correct, concise, and safe.".into(),
        categories: Some(categories),
        model: "qwen2.5:latest".into(),
        latency_ms: 200.0,
    }
}

/// Target-model stub counting invocations
struct StubProvider {
    outcome: Result<InferenceResult, String>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &InferenceOptions,
    ) -> Result<InferenceResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|reason| LlmError::Provider {
            status: 429,
            body: reason,
        })
    }
}

struct StubFactory {
    outcome: Result<InferenceResult, String>,
    calls: Arc<AtomicUsize>,
}

impl StubFactory {
    fn succeeding() -> Self {
        Self {
            outcome: Ok(stub_inference_result()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ProviderFactory for StubFactory {
    fn create_provider(
        &self,
        _logical_name: &str,
        _api_key: &ApiKey,
    ) -> Result<Box<dyn LlmProvider>, LlmError> {
        Ok(Box::new(StubProvider {
            outcome: self.outcome.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// Judge stub
struct StubJudge {
    outcome: Result<JudgeResult, String>,
}

#[async_trait]
impl JudgeGateway for StubJudge {
    async fn evaluate(
        &self,
        _original_prompt: &str,
        _model_response: &str,
        _judge_model: &str,
    ) -> Result<JudgeResult, JudgeError> {
        self.outcome.clone().map_err(|reason| JudgeError::Service {
            status: 503,
            body: reason,
        })
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// State wrapper that records every observed stage write, in order
struct RecordingState {
    inner: InMemoryStateRepository,
    stages: Mutex<Vec<RequestStage>>,
}

impl RecordingState {
    fn new() -> Self {
        Self {
            inner: InMemoryStateRepository::new(),
            stages: Mutex::new(Vec::new()),
        }
    }

    fn observed_stages(&self) -> Vec<RequestStage> {
        self.stages.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateRepository for RecordingState {
    async fn create(
        &self,
        request_id: &str,
        record: &ProcessedRequest,
    ) -> Result<ProcessedRequest, StateError> {
        self.stages.lock().unwrap().push(record.stage);
        self.inner.create(request_id, record).await
    }

    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StateError> {
        self.inner.get(request_id).await
    }

    async fn update(
        &self,
        request_id: &str,
        patch: &StatePatch,
    ) -> Result<Option<ProcessedRequest>, StateError> {
        if let Some(stage) = patch.stage {
            self.stages.lock().unwrap().push(stage);
        }
        self.inner.update(request_id, patch).await
    }

    async fn delete(&self, request_id: &str) -> Result<bool, StateError> {
        self.inner.delete(request_id).await
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}

struct Pipeline {
    broker: Arc<InMemoryBroker>,
    state: Arc<RecordingState>,
    archive: Arc<InMemoryArchive>,
    submission: SubmissionService,
    consumers: Vec<Arc<InMemoryConsumer>>,
    runners: Vec<tokio::task::JoinHandle<()>>,
}

impl Pipeline {
    fn start(factory: StubFactory, judge: StubJudge) -> Self {
        let broker = InMemoryBroker::new();
        let state = Arc::new(RecordingState::new());
        let archive = Arc::new(InMemoryArchive::new());

        let submission = SubmissionService::new(state.clone(), broker.clone(), "inference");

        let inference_handler = Arc::new(InferenceOrchestrator::new(
            state.clone(),
            broker.clone(),
            Arc::new(factory),
            "judge",
        ));
        let judge_handler = Arc::new(JudgeOrchestrator::new(
            state.clone(),
            archive.clone(),
            Arc::new(judge),
        ));

        let consumers = vec![
            Arc::new(broker.consumer("inference", inference_handler, 4)),
            Arc::new(broker.consumer("judge", judge_handler, 4)),
        ];
        let runners = consumers
            .iter()
            .map(|consumer| {
                let consumer = Arc::clone(consumer);
                tokio::spawn(async move {
                    let _ = consumer.start().await;
                })
            })
            .collect();

        Self {
            broker,
            state,
            archive,
            submission,
            consumers,
            runners,
        }
    }

    async fn stop(self) {
        for consumer in &self.consumers {
            consumer.close().await;
        }
        for runner in self.runners {
            let _ = runner.await;
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not met within 3s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn happy_path_runs_all_four_stages_and_archives() {
    let pipeline = Pipeline::start(
        StubFactory::succeeding(),
        StubJudge {
            outcome: Ok(stub_verdict()),
        },
    );

    let response = pipeline.submission.submit(submission()).await.unwrap();
    let archive = pipeline.archive.clone();
    wait_until(|| archive.row_count() == 1).await;

    // Stages observed in lifecycle order.
    assert_eq!(
        pipeline.state.observed_stages(),
        vec![
            RequestStage::Gateway,
            RequestStage::Inference,
            RequestStage::Judge,
            RequestStage::Completed,
        ]
    );

    let record = pipeline
        .state
        .get(&response.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.stage, RequestStage::Completed);
    assert!(record.inference_result.is_some());
    assert!(record.judge_result.is_some());

    let rows = pipeline.archive.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].request_id, response.request_id);
    assert_eq!(rows[0].status, RequestStage::Completed);
    assert_eq!(rows[0].judge_score, Some(0.95));
    assert_eq!(rows[0].inference_tokens, Some(18));

    pipeline.stop().await;
}

#[tokio::test]
async fn inference_failure_marks_failed_and_skips_judge_and_archive() {
    let pipeline = Pipeline::start(
        StubFactory::failing("Rate limit exceeded"),
        StubJudge {
            outcome: Ok(stub_verdict()),
        },
    );

    let response = pipeline.submission.submit(submission()).await.unwrap();
    let state = pipeline.state.clone();
    let request_id = response.request_id.clone();
    wait_until(move || {
        state
            .stages
            .lock()
            .unwrap()
            .contains(&RequestStage::Failed)
    })
    .await;

    let record = pipeline.state.get(&request_id).await.unwrap().unwrap();
    assert_eq!(record.stage, RequestStage::Failed);
    assert!(record.error_message.unwrap().contains("Rate limit"));

    // No judge message was published and the inference handler does not
    // archive; the failure record only lives in state until its TTL.
    assert!(pipeline.broker.published("judge").is_empty());
    assert_eq!(pipeline.archive.row_count(), 0);

    pipeline.stop().await;
}

#[tokio::test]
async fn judge_failure_archives_a_failed_row_best_effort() {
    let pipeline = Pipeline::start(
        StubFactory::succeeding(),
        StubJudge {
            outcome: Err("judge model unavailable".into()),
        },
    );

    let response = pipeline.submission.submit(submission()).await.unwrap();
    let archive = pipeline.archive.clone();
    wait_until(|| archive.row_count() == 1).await;

    let record = pipeline
        .state
        .get(&response.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.stage, RequestStage::Failed);

    let rows = pipeline.archive.rows();
    assert_eq!(rows[0].status, RequestStage::Failed);
    assert!(rows[0].judge_score.is_none());
    assert_eq!(rows[0].inference_response.as_deref(), Some("2+2 equals 4."));

    pipeline.stop().await;
}

#[tokio::test]
async fn redelivery_after_failed_publish_reaches_exactly_one_archive_row() {
    let factory = StubFactory::succeeding();
    let provider_calls = Arc::clone(&factory.calls);
    let pipeline = Pipeline::start(
        factory,
        StubJudge {
            outcome: Ok(stub_verdict()),
        },
    );

    // First publish to the judge topic fails after a successful model call;
    // the message redelivers and the second attempt goes through.
    pipeline.broker.fail_next_publishes("judge", 1);

    let response = pipeline.submission.submit(submission()).await.unwrap();
    let archive = pipeline.archive.clone();
    wait_until(|| archive.row_count() == 1).await;

    assert_eq!(provider_calls.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.broker.published("judge").len(), 1);

    let record = pipeline
        .state
        .get(&response.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.stage, RequestStage::Completed);
    assert_eq!(pipeline.archive.row_count(), 1);

    pipeline.stop().await;
}
