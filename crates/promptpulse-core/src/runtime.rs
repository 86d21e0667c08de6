//! Worker process wiring
//!
//! One function per process kind: build the gateways from configuration,
//! assemble the worker, run it until a shutdown signal, close cleanly.
//! Missing configuration fails here, at startup, not mid-message.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::archive::{ArchiveError, HttpArchiveClient};
use crate::config::PipelineConfig;
use crate::health::{ArchiveHealth, HealthChecker, HealthServer, JudgeHealth, StateHealth};
use crate::judge::{HttpJudgeClient, JudgeError};
use crate::llm::DefaultProviderFactory;
use crate::messaging::{
    build_consumer, build_publisher, BrokerSetupError, ConsumeError, MessageConsumer, WorkerQueue,
};
use crate::pipeline::{serve_gateway, InferenceOrchestrator, JudgeOrchestrator, SubmissionService};
use crate::shutdown::GracefulShutdown;
use crate::state::{RedisStateRepository, StateError, StateRepository};

/// Errors that stop a worker process from starting or running
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    /// State store connection failed
    #[error(transparent)]
    State(#[from] StateError),

    /// Broker backend could not be assembled
    #[error(transparent)]
    Broker(#[from] BrokerSetupError),

    /// Archive client could not be created
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Judge client could not be created
    #[error(transparent)]
    Judge(#[from] JudgeError),

    /// The consume loop failed
    #[error(transparent)]
    Consume(#[from] ConsumeError),

    /// A listen socket could not be bound
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured listen address did not parse
    #[error("invalid listen address: {0}")]
    ListenAddr(String),
}

async fn connect_state(config: &PipelineConfig) -> Result<Arc<dyn StateRepository>, RuntimeError> {
    let repository = RedisStateRepository::connect(&config.redis).await?;
    Ok(Arc::new(repository))
}

fn listen_addr(host: &str, port: u16) -> Result<SocketAddr, RuntimeError> {
    let ip = host
        .parse()
        .map_err(|_| RuntimeError::ListenAddr(format!("{host}:{port}")))?;
    Ok(SocketAddr::new(ip, port))
}

fn spawn_health_server(checker: HealthChecker, port: u16, shutdown: &GracefulShutdown) {
    let server = HealthServer::new(checker, port);
    let mut token = shutdown.token();
    tokio::spawn(async move {
        if let Err(e) = server.serve(async move { token.cancelled().await }).await {
            tracing::error!(error = %e, "Health endpoint failed");
        }
    });
}

/// Run the gateway: submission API plus its health endpoint
pub async fn run_gateway(config: PipelineConfig) -> Result<(), RuntimeError> {
    let state = connect_state(&config).await?;
    let publisher = build_publisher(&config).await?;
    let service = Arc::new(SubmissionService::new(
        Arc::clone(&state),
        publisher,
        config.topics.inference.clone(),
    ));

    let shutdown = GracefulShutdown::new();
    spawn_health_server(
        HealthChecker::new().with_dependency(StateHealth(state)),
        config.services.health_port,
        &shutdown,
    );

    let addr = listen_addr(&config.services.gateway.host, config.services.gateway.port)?;
    let mut token = shutdown.token();
    let api = tokio::spawn(serve_gateway(addr, service, async move {
        token.cancelled().await;
    }));

    shutdown.wait().await;
    match api.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Gateway API task aborted"),
    }
    Ok(())
}

/// Run the inference worker until a shutdown signal
pub async fn run_inference_worker(config: PipelineConfig) -> Result<(), RuntimeError> {
    let state = connect_state(&config).await?;
    let publisher = build_publisher(&config).await?;

    let handler = Arc::new(InferenceOrchestrator::new(
        Arc::clone(&state),
        publisher,
        Arc::new(DefaultProviderFactory),
        config.topics.judge.clone(),
    ));
    let consumer = build_consumer(&config, WorkerQueue::Inference, handler).await?;

    let shutdown = GracefulShutdown::new();
    spawn_health_server(
        HealthChecker::new().with_dependency(StateHealth(state)),
        config.services.health_port,
        &shutdown,
    );

    run_consumer(consumer, &shutdown).await
}

/// Run the judge worker until a shutdown signal
pub async fn run_judge_worker(config: PipelineConfig) -> Result<(), RuntimeError> {
    let state = connect_state(&config).await?;
    let archive: Arc<dyn crate::archive::ArchiveGateway> =
        Arc::new(HttpArchiveClient::new(&config.services.archive)?);
    let judge: Arc<dyn crate::judge::JudgeGateway> =
        Arc::new(HttpJudgeClient::new(&config.services.judge)?);

    let handler = Arc::new(JudgeOrchestrator::new(
        Arc::clone(&state),
        Arc::clone(&archive),
        Arc::clone(&judge),
    ));
    let consumer = build_consumer(&config, WorkerQueue::Judge, handler).await?;

    let shutdown = GracefulShutdown::new();
    spawn_health_server(
        HealthChecker::new()
            .with_dependency(StateHealth(state))
            .with_dependency(ArchiveHealth(archive))
            .with_dependency(JudgeHealth(judge)),
        config.services.health_port,
        &shutdown,
    );

    run_consumer(consumer, &shutdown).await
}

async fn run_consumer(
    consumer: Arc<dyn MessageConsumer>,
    shutdown: &GracefulShutdown,
) -> Result<(), RuntimeError> {
    let result = {
        let consumer = Arc::clone(&consumer);
        tokio::select! {
            result = consumer.start() => result.map(|_| None),
            signal = shutdown.wait() => Ok(Some(signal)),
        }
    };

    match result? {
        Some(signal) => {
            tracing::info!(signal = %signal, "Closing consumer");
            consumer.close().await;
            Ok(())
        }
        None => Ok(()),
    }
}
