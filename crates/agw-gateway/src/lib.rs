// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The tool catalog.
pub mod catalog;

pub use catalog::ToolCatalog;

use agw_adapters::{AdapterDispatcher, AdapterError};
use agw_audit::{AuditEntryBuilder, AuditSink, AuditStream, MemorySink, ViewGenerator};
use agw_config::GatewayConfig;
use agw_core::clock::Deadline;
use agw_core::{
    AuditEventType, AuditSeverity, ExecutionResult, HumanReview, NormalizedRequest, ProtocolTag,
    ReviewDecision, RoutingDecision, id,
};
use agw_credentials::{CredentialStore, MemoryCredentialStore, Secret};
use agw_embedding::{EmbeddingProvider, EmbeddingService};
use agw_error::{ErrorCode, GatewayError};
use agw_router::{IntentRouter, RouterError};
use agw_sandbox::{InProcessDriver, SandboxDriver, SandboxError, SandboxRuntime};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Default end-to-end deadline for one request.
pub const DEFAULT_DEADLINE_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What processing one request produced.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The tool ran; the result may still report an execution failure.
    Executed {
        /// The normalized request.
        request: NormalizedRequest,
        /// The routing decision that selected the tool.
        decision: RoutingDecision,
        /// The execution result.
        result: ExecutionResult,
    },
    /// The decision needs a human sign-off; nothing was executed.
    ApprovalPending {
        /// The normalized request.
        request: NormalizedRequest,
        /// The decision awaiting review.
        decision: RoutingDecision,
    },
}

/// Process-wide request counters exposed for upstream backpressure.
///
/// The 1 000 req/s budget itself is enforced by the front door; the core
/// only counts.
#[derive(Debug, Default)]
pub struct RequestCounter {
    total: AtomicU64,
    in_flight: AtomicU64,
}

impl RequestCounter {
    /// Requests accepted over the process lifetime.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Requests currently inside the pipeline.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    fn enter(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// The request-processing pipeline: adapters → router → sandbox runtime,
/// with an audit entry at every transition.
pub struct Gateway {
    dispatcher: AdapterDispatcher,
    router: IntentRouter,
    runtime: SandboxRuntime,
    audit: AuditStream,
    views: ViewGenerator,
    credentials: Arc<dyn CredentialStore>,
    catalog: ToolCatalog,
    counter: RequestCounter,
}

impl Gateway {
    /// Assemble a gateway from its pluggable edges.
    #[must_use]
    pub fn new(
        config: &GatewayConfig,
        driver: Arc<dyn SandboxDriver>,
        sink: Arc<dyn AuditSink>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let embeddings = Arc::new(EmbeddingService::from_config(&config.embedding));
        Self {
            dispatcher: AdapterDispatcher::new(),
            router: IntentRouter::new(embeddings, config.router.clone()),
            runtime: SandboxRuntime::new(driver, config.sandbox.clone()),
            audit: AuditStream::new(sink, config.audit.clone()),
            views: ViewGenerator::new(),
            credentials,
            catalog: ToolCatalog::new(),
            counter: RequestCounter::default(),
        }
    }

    /// A gateway wired to the in-process driver, an in-memory audit sink,
    /// and an in-memory credential store.
    #[must_use]
    pub fn with_defaults(config: &GatewayConfig) -> Self {
        Self::new(
            config,
            Arc::new(InProcessDriver::new()),
            Arc::new(MemorySink::new()),
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    /// Assemble a gateway around a custom embedding provider (e.g. a real
    /// model client) instead of the deterministic reference provider.
    #[must_use]
    pub fn with_provider(
        config: &GatewayConfig,
        provider: Arc<dyn EmbeddingProvider>,
        driver: Arc<dyn SandboxDriver>,
        sink: Arc<dyn AuditSink>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let embeddings = Arc::new(EmbeddingService::new(
            provider,
            Duration::from_millis(config.embedding.cache_ttl_ms),
        ));
        Self {
            dispatcher: AdapterDispatcher::new(),
            router: IntentRouter::new(embeddings, config.router.clone()),
            runtime: SandboxRuntime::new(driver, config.sandbox.clone()),
            audit: AuditStream::new(sink, config.audit.clone()),
            views: ViewGenerator::new(),
            credentials,
            catalog: ToolCatalog::new(),
            counter: RequestCounter::default(),
        }
    }

    /// The tool catalog.
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// The audit stream.
    #[must_use]
    pub fn audit(&self) -> &AuditStream {
        &self.audit
    }

    /// The view generator (with its comprehension telemetry).
    #[must_use]
    pub fn views(&self) -> &ViewGenerator {
        &self.views
    }

    /// The sandbox runtime.
    #[must_use]
    pub fn sandbox(&self) -> &SandboxRuntime {
        &self.runtime
    }

    /// The request counters.
    #[must_use]
    pub fn requests(&self) -> &RequestCounter {
        &self.counter
    }

    /// Detect the protocol of a raw payload.
    #[must_use]
    pub fn detect_protocol(&self, raw: &[u8]) -> Option<ProtocolTag> {
        self.dispatcher.detect_protocol(raw)
    }

    /// Convert a raw payload without routing or executing.
    ///
    /// # Errors
    ///
    /// Surfaces adapter failures as [`GatewayError`]s.
    pub fn convert(
        &self,
        raw: &[u8],
        tag: ProtocolTag,
    ) -> Result<NormalizedRequest, GatewayError> {
        self.dispatcher
            .convert(raw, tag, None)
            .map_err(AdapterError::into_gateway_error)
    }

    /// Process a request end to end under the default deadline, detecting
    /// the protocol when `tag` is `None`.
    ///
    /// # Errors
    ///
    /// See [`process_with_deadline`](Self::process_with_deadline).
    pub async fn process(
        &self,
        raw: &[u8],
        tag: Option<ProtocolTag>,
    ) -> Result<ProcessOutcome, GatewayError> {
        self.process_with_deadline(raw, tag, Duration::from_millis(DEFAULT_DEADLINE_MS))
            .await
    }

    /// Process a request end to end.
    ///
    /// Pipeline: detect (when untagged) → convert → route → resolve
    /// credentials → execute, appending an audit entry at every
    /// transition. A decision that requires approval stops at the gate and
    /// returns [`ProcessOutcome::ApprovalPending`]. Partial audit entries
    /// commit even when a later stage fails.
    ///
    /// # Errors
    ///
    /// Every failure carries a stable [`ErrorCode`], a human message, and
    /// where useful a suggestion; no stack traces cross this boundary.
    pub async fn process_with_deadline(
        &self,
        raw: &[u8],
        tag: Option<ProtocolTag>,
        deadline: Duration,
    ) -> Result<ProcessOutcome, GatewayError> {
        self.counter.enter();
        let outcome = self.process_inner(raw, tag, Deadline::after(deadline)).await;
        self.counter.exit();
        outcome
    }

    async fn process_inner(
        &self,
        raw: &[u8],
        tag: Option<ProtocolTag>,
        deadline: Deadline,
    ) -> Result<ProcessOutcome, GatewayError> {
        let trace_id = id::new_trace_id();

        self.write_entry(
            AuditEntryBuilder::new(AuditEventType::RequestReceived)
                .trace_id(&trace_id)
                .action("receive")
                .target("gateway")
                .detail("byte_size", raw.len()),
        )
        .await;

        // Detect when untagged.
        let tag = match tag {
            Some(tag) => tag,
            None => match self.dispatcher.detect_protocol(raw) {
                Some(tag) => tag,
                None => {
                    return Err(GatewayError::new(
                        ErrorCode::UnsupportedProtocol,
                        "no registered protocol accepts this payload",
                    )
                    .with_suggestion("tag the request explicitly or check the payload shape")
                    .with_context("byte_size", raw.len()));
                }
            },
        };
        self.write_entry(
            AuditEntryBuilder::new(AuditEventType::ProtocolDetected)
                .trace_id(&trace_id)
                .action("detect")
                .target(tag.label())
                .detail("protocol", tag.label()),
        )
        .await;

        // Convert.
        let request = match self.dispatcher.convert(raw, tag, Some(trace_id.clone())) {
            Ok(request) => request,
            Err(e) => {
                self.audit_failure(
                    &trace_id,
                    None,
                    AuditEventType::IntentClassified,
                    &e.to_string(),
                )
                .await;
                return Err(e.into_gateway_error());
            }
        };
        self.write_entry(
            AuditEntryBuilder::new(AuditEventType::IntentClassified)
                .trace_id(&trace_id)
                .request_id(request.id)
                .action("classify")
                .target(&request.intent.action)
                .detail("category", request.intent.category.as_str())
                .detail("confidence", request.intent.confidence),
        )
        .await;
        self.check_deadline(&deadline, &trace_id, Some(&request))
            .await?;

        // Route.
        let catalog = self.catalog.snapshot();
        let decision = match self.router.route(&request, &catalog).await {
            Ok(decision) => decision,
            Err(e) => {
                self.audit_failure(
                    &trace_id,
                    Some(request.id),
                    AuditEventType::RoutingDecision,
                    &e.to_string(),
                )
                .await;
                return Err(router_error(e));
            }
        };
        self.write_entry(
            AuditEntryBuilder::new(AuditEventType::RoutingDecision)
                .trace_id(&trace_id)
                .request_id(request.id)
                .action("route")
                .target(&decision.tool.id)
                .detail("confidence", decision.confidence)
                .detail("fallbacks", decision.fallbacks.len())
                .detail("reasoning", decision.reasoning.clone()),
        )
        .await;

        // Approval gate.
        if decision.requires_approval || request.metadata.require_human_approval {
            self.write_entry(
                AuditEntryBuilder::new(AuditEventType::HumanApprovalRequested)
                    .trace_id(&trace_id)
                    .request_id(request.id)
                    .action("request_approval")
                    .target(&decision.tool.id)
                    .detail(
                        "reason",
                        decision
                            .approval_reason
                            .clone()
                            .unwrap_or_else(|| "caller requires human approval".to_string()),
                    ),
            )
            .await;
            info!(trace_id, tool = %decision.tool.id, "decision gated on human approval");
            return Ok(ProcessOutcome::ApprovalPending { request, decision });
        }

        self.check_deadline(&deadline, &trace_id, Some(&request))
            .await?;
        let result = self.execute(&request, &decision, &deadline).await?;
        Ok(ProcessOutcome::Executed {
            request,
            decision,
            result,
        })
    }

    /// Resolve a completed human review: record it, then execute when the
    /// reviewer approved (possibly with modifications).
    ///
    /// Returns `None` when the reviewer rejected.
    ///
    /// # Errors
    ///
    /// Surfaces execution-stage failures exactly like
    /// [`process_with_deadline`](Self::process_with_deadline).
    pub async fn complete_review(
        &self,
        request: &NormalizedRequest,
        decision: &RoutingDecision,
        review: HumanReview,
    ) -> Result<Option<ExecutionResult>, GatewayError> {
        let approved = review.decision != ReviewDecision::Rejected;
        self.write_entry(
            AuditEntryBuilder::new(AuditEventType::HumanReviewCompleted)
                .trace_id(&request.metadata.trace_id)
                .request_id(request.id)
                .actor(&review.reviewer_id)
                .action("review")
                .target(&decision.tool.id)
                .detail("decision", format!("{:?}", review.decision).to_lowercase()),
        )
        .await;

        if !approved {
            return Ok(None);
        }
        let deadline = Deadline::after(Duration::from_millis(DEFAULT_DEADLINE_MS));
        self.execute(request, decision, &deadline).await.map(Some)
    }

    async fn execute(
        &self,
        request: &NormalizedRequest,
        decision: &RoutingDecision,
        deadline: &Deadline,
    ) -> Result<ExecutionResult, GatewayError> {
        let trace_id = &request.metadata.trace_id;
        let tool = &decision.tool;

        // Resolve the tool's credentials before dispatch.
        let mut secrets: Vec<Secret> = Vec::with_capacity(tool.required_credentials.len());
        for credential_id in &tool.required_credentials {
            match self.credentials.resolve(credential_id).await {
                Ok(secret) => {
                    self.write_entry(
                        AuditEntryBuilder::new(AuditEventType::CredentialAccessed)
                            .trace_id(trace_id)
                            .request_id(request.id)
                            .action("resolve")
                            .target(credential_id),
                    )
                    .await;
                    secrets.push(secret);
                }
                Err(e) => {
                    self.write_entry(
                        AuditEntryBuilder::new(AuditEventType::CredentialAccessed)
                            .trace_id(trace_id)
                            .request_id(request.id)
                            .severity(AuditSeverity::Error)
                            .action("resolve")
                            .target(credential_id)
                            .detail("missing", true),
                    )
                    .await;
                    return Err(GatewayError::new(e.error_code(), e.to_string())
                        .with_suggestion("enroll the credential before routing to this tool")
                        .with_context("tool", &tool.id));
                }
            }
        }

        // Arguments: the normalized parameters plus resolved secrets as env.
        let mut args = serde_json::Map::new();
        for (key, value) in &request.intent.parameters {
            args.insert(key.clone(), value.clone());
        }
        if !secrets.is_empty() {
            let env: serde_json::Map<String, serde_json::Value> = secrets
                .iter()
                .map(|s| {
                    (
                        s.credential_id.clone(),
                        serde_json::Value::String(s.expose().to_string()),
                    )
                })
                .collect();
            args.insert("__credentials".to_string(), serde_json::Value::Object(env));
        }
        let args = serde_json::Value::Object(args);

        let timeout = deadline
            .remaining()
            .min(Duration::from_millis(agw_sandbox::DEFAULT_TIMEOUT_MS));
        if timeout.is_zero() {
            self.audit_failure(
                trace_id,
                Some(request.id),
                AuditEventType::ToolFailed,
                "deadline expired before dispatch",
            )
            .await;
            return Err(timeout_error());
        }

        let result = match self
            .runtime
            .execute_with_timeout(tool, &args, timeout)
            .await
        {
            Ok(result) => result,
            Err(e @ SandboxError::PoolExhausted { .. }) => {
                self.audit_failure(
                    trace_id,
                    Some(request.id),
                    AuditEventType::ToolFailed,
                    &e.to_string(),
                )
                .await;
                return Err(GatewayError::new(e.error_code(), e.to_string())
                    .with_suggestion("retry after a sandbox returns, or raise max_instances"));
            }
        };

        if result.metrics.cold_start_ms > 0 {
            self.write_entry(
                AuditEntryBuilder::new(AuditEventType::SandboxCreated)
                    .trace_id(trace_id)
                    .request_id(request.id)
                    .action("create_sandbox")
                    .target(&tool.id)
                    .detail("cold_start_ms", result.metrics.cold_start_ms),
            )
            .await;
        }

        if result.success {
            self.write_entry(
                AuditEntryBuilder::new(AuditEventType::ToolExecuted)
                    .trace_id(trace_id)
                    .request_id(request.id)
                    .action("execute")
                    .target(&tool.id)
                    .detail("execution_ms", result.metrics.execution_ms)
                    .detail("total_ms", result.metrics.total_ms),
            )
            .await;
        } else {
            let failure = result.error.as_ref();
            self.write_entry(
                AuditEntryBuilder::new(AuditEventType::ToolFailed)
                    .trace_id(trace_id)
                    .request_id(request.id)
                    .severity(AuditSeverity::Error)
                    .action("execute")
                    .target(&tool.id)
                    .detail(
                        "code",
                        failure.map_or("UNKNOWN", |f| f.code.as_str()).to_string(),
                    )
                    .detail(
                        "message",
                        failure.map_or(String::new(), |f| f.message.clone()),
                    ),
            )
            .await;
        }

        debug!(trace_id, tool = %tool.id, success = result.success, "execution finished");
        Ok(result)
    }

    async fn check_deadline(
        &self,
        deadline: &Deadline,
        trace_id: &str,
        request: Option<&NormalizedRequest>,
    ) -> Result<(), GatewayError> {
        if deadline.expired() {
            self.audit_failure(
                trace_id,
                request.map(|r| r.id),
                AuditEventType::ToolFailed,
                "pipeline deadline expired",
            )
            .await;
            return Err(timeout_error());
        }
        Ok(())
    }

    async fn audit_failure(
        &self,
        trace_id: &str,
        request_id: Option<uuid::Uuid>,
        stage: AuditEventType,
        message: &str,
    ) {
        let mut builder = AuditEntryBuilder::new(stage)
            .trace_id(trace_id)
            .severity(AuditSeverity::Error)
            .action("pipeline")
            .target("gateway")
            .detail("message", message.to_string());
        if let Some(request_id) = request_id {
            builder = builder.request_id(request_id);
        }
        self.write_entry(builder).await;
    }

    async fn write_entry(&self, builder: AuditEntryBuilder) {
        self.audit.write(builder.build()).await;
    }
}

fn router_error(e: RouterError) -> GatewayError {
    let code = e.error_code();
    match e {
        RouterError::NoMatch { alternatives } => {
            let mut err = GatewayError::new(code, "no tool cleared the routing thresholds")
                .with_suggestion("rephrase the request or register a closer tool");
            for (i, candidate) in alternatives.iter().enumerate() {
                err = err.with_context(
                    format!("alternative_{i}"),
                    format!("{} ({:.3})", candidate.tool_id, candidate.similarity),
                );
            }
            err
        }
        other => GatewayError::new(code, other.to_string()),
    }
}

fn timeout_error() -> GatewayError {
    GatewayError::new(ErrorCode::Timeout, "the request exceeded its deadline")
        .with_suggestion("raise the deadline or reduce the catalog size")
}
