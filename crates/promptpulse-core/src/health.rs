//! Dependency health checks
//!
//! Each worker exposes `/health` reporting the dependencies it actually
//! uses: the state store always, plus the archive and judge gateways on the
//! judge worker. A failing dependency turns the endpoint 503 so
//! orchestration can restart or drain the worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::archive::ArchiveGateway;
use crate::judge::JudgeGateway;
use crate::state::StateRepository;

/// Status of a single dependency probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// The dependency answered its probe
    Healthy,
    /// The dependency is down or unreachable
    Unhealthy(String),
}

impl DependencyStatus {
    /// Whether the probe passed
    pub fn is_healthy(&self) -> bool {
        matches!(self, DependencyStatus::Healthy)
    }
}

/// Probe result for one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    /// Dependency name, e.g. `"state-store"`
    pub name: String,
    /// Probe outcome
    pub status: DependencyStatus,
}

/// Aggregated probe results for a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"healthy"` or `"unhealthy"`
    pub status: String,
    /// Individual dependency outcomes
    pub dependencies: Vec<DependencyReport>,
}

impl HealthReport {
    /// Whether every dependency passed
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    /// The HTTP status the health endpoint should answer with
    pub fn http_status(&self) -> u16 {
        if self.is_healthy() {
            200
        } else {
            503
        }
    }
}

/// A dependency that can be probed
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Name used in the report
    fn name(&self) -> &str;

    /// Run the probe
    async fn check(&self) -> DependencyStatus;
}

/// Probes a fixed set of dependencies with a per-probe timeout
pub struct HealthChecker {
    dependencies: Vec<Arc<dyn Dependency>>,
    probe_timeout: Duration,
}

impl HealthChecker {
    /// Create a checker with no dependencies
    pub fn new() -> Self {
        Self {
            dependencies: Vec::new(),
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Add a dependency to probe
    pub fn with_dependency<D: Dependency + 'static>(mut self, dependency: D) -> Self {
        self.dependencies.push(Arc::new(dependency));
        self
    }

    /// Probe everything and aggregate
    pub async fn check_all(&self) -> HealthReport {
        let mut reports = Vec::with_capacity(self.dependencies.len());
        let mut all_healthy = true;

        for dependency in &self.dependencies {
            let status = match tokio::time::timeout(self.probe_timeout, dependency.check()).await {
                Ok(status) => status,
                Err(_) => DependencyStatus::Unhealthy(format!(
                    "probe timed out after {:?}",
                    self.probe_timeout
                )),
            };
            all_healthy &= status.is_healthy();
            reports.push(DependencyReport {
                name: dependency.name().to_string(),
                status,
            });
        }

        HealthReport {
            status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
            dependencies: reports,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// State store probe
pub struct StateHealth(pub Arc<dyn StateRepository>);

#[async_trait]
impl Dependency for StateHealth {
    fn name(&self) -> &str {
        "state-store"
    }

    async fn check(&self) -> DependencyStatus {
        if self.0.is_healthy().await {
            DependencyStatus::Healthy
        } else {
            DependencyStatus::Unhealthy("state store did not answer".into())
        }
    }
}

/// Archive service probe
pub struct ArchiveHealth(pub Arc<dyn ArchiveGateway>);

#[async_trait]
impl Dependency for ArchiveHealth {
    fn name(&self) -> &str {
        "archive"
    }

    async fn check(&self) -> DependencyStatus {
        if self.0.is_healthy().await {
            DependencyStatus::Healthy
        } else {
            DependencyStatus::Unhealthy("archive service did not answer".into())
        }
    }
}

/// Judge service probe
pub struct JudgeHealth(pub Arc<dyn JudgeGateway>);

#[async_trait]
impl Dependency for JudgeHealth {
    fn name(&self) -> &str {
        "judge"
    }

    async fn check(&self) -> DependencyStatus {
        if self.0.is_healthy().await {
            DependencyStatus::Healthy
        } else {
            DependencyStatus::Unhealthy("judge service did not answer".into())
        }
    }
}

/// Minimal HTTP server for a worker's health endpoint
pub struct HealthServer {
    checker: Arc<HealthChecker>,
    port: u16,
}

impl HealthServer {
    /// Serve `checker` on `0.0.0.0:port`
    pub fn new(checker: HealthChecker, port: u16) -> Self {
        Self {
            checker: Arc::new(checker),
            port,
        }
    }

    /// Run until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(port = self.port, "Health endpoint listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let io = TokioIo::new(stream);
                    let checker = Arc::clone(&self.checker);

                    tokio::spawn(async move {
                        let service = service_fn(move |request| {
                            let checker = Arc::clone(&checker);
                            async move { handle_request(request, checker).await }
                        });
                        let _ = http1::Builder::new().serve_connection(io, service).await;
                    });
                }
            }
        }
    }
}

async fn handle_request(
    request: Request<hyper::body::Incoming>,
    checker: Arc<HealthChecker>,
) -> Result<Response<String>, std::convert::Infallible> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, "/health") => {
            let report = checker.check_all().await;
            let status = StatusCode::from_u16(report.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = serde_json::to_string(&report)
                .unwrap_or_else(|_| r#"{"status":"unhealthy"}"#.to_string());
            Response::builder()
                .status(status)
                .header("Content-Type", "application/json")
                .body(body)
        }
        (&Method::GET, "/live") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(r#"{"alive":true}"#.to_string()),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body("Not Found".to_string()),
    };

    Ok(response.unwrap_or_else(|_| Response::new(String::new())))
}
