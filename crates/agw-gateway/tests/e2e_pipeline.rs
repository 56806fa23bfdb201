// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end pipeline: raw bytes in, audited execution out.

use agw_audit::{AuditFilter, MemorySink, ViewAction};
use agw_config::GatewayConfig;
use agw_core::{
    AuditEventType, HumanReview, ProtocolTag, ReviewDecision, ToolDefinition,
};
use agw_credentials::MemoryCredentialStore;
use agw_embedding::{EmbeddingError, EmbeddingProvider};
use agw_gateway::{Gateway, ProcessOutcome};
use agw_sandbox::InProcessDriver;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Embeds by keyword so tests control similarities exactly.
struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_id(&self) -> &str {
        "keyword-fixture"
    }
    fn dimensions(&self) -> usize {
        2
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let cos: f32 = if text.contains("Action: search") || text.contains("search the web") {
            1.0
        } else if text.contains("borderline") {
            0.75
        } else {
            0.1
        };
        Ok(vec![cos, (1.0 - cos * cos).sqrt()])
    }
}

struct Fixture {
    gateway: Gateway,
    sink: MemorySink,
    driver: InProcessDriver,
    credentials: Arc<MemoryCredentialStore>,
}

fn fixture(config: GatewayConfig) -> Fixture {
    let sink = MemorySink::new();
    let driver = InProcessDriver::new();
    let credentials = Arc::new(MemoryCredentialStore::new());
    let gateway = Gateway::with_provider(
        &config,
        Arc::new(KeywordProvider),
        Arc::new(driver.clone()),
        Arc::new(sink.clone()),
        Arc::clone(&credentials) as Arc<dyn agw_credentials::CredentialStore>,
    );
    Fixture {
        gateway,
        sink,
        driver,
        credentials,
    }
}

fn mcp_search_call() -> Vec<u8> {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "search", "arguments": {"q": "hi"}}
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn mcp_tool_call_flows_through_to_execution() {
    let fx = fixture(GatewayConfig::default());
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("web-search", "search the web"));
    fx.driver
        .register("web-search", |args| Ok(json!({"hits": [args["q"].clone()]})));
    // Make the cold start measurable so it lands in the audit trail.
    fx.driver
        .set_create_delay(std::time::Duration::from_millis(5));

    let outcome = fx.gateway.process(&mcp_search_call(), None).await.unwrap();
    let ProcessOutcome::Executed {
        request,
        decision,
        result,
    } = outcome
    else {
        panic!("expected execution");
    };

    assert_eq!(request.source_protocol, ProtocolTag::Mcp);
    assert_eq!(request.intent.action, "search");
    assert!((request.intent.confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(decision.tool.id, "web-search");
    assert!(!decision.requires_approval);
    assert!(result.success);
    assert_eq!(result.output.unwrap()["hits"][0], json!("hi"));

    // Every pipeline transition left an audit entry under one trace.
    fx.gateway.audit().flush().await;
    let entries = fx.sink.persisted();
    let trace = &request.metadata.trace_id;
    let kinds: Vec<AuditEventType> = entries
        .iter()
        .filter(|e| &e.trace_id == trace)
        .map(|e| e.event_type)
        .collect();
    assert!(kinds.contains(&AuditEventType::RequestReceived));
    assert!(kinds.contains(&AuditEventType::ProtocolDetected));
    assert!(kinds.contains(&AuditEventType::IntentClassified));
    assert!(kinds.contains(&AuditEventType::RoutingDecision));
    assert!(kinds.contains(&AuditEventType::SandboxCreated));
    assert!(kinds.contains(&AuditEventType::ToolExecuted));
    assert_eq!(fx.gateway.requests().total(), 1);
    assert_eq!(fx.gateway.requests().in_flight(), 0);
}

#[tokio::test]
async fn malformed_payload_surfaces_a_stable_code() {
    let fx = fixture(GatewayConfig::default());
    let raw = json!({"jsonrpc": "2.0", "id": 1}).to_string().into_bytes();
    let err = fx
        .gateway
        .process(&raw, Some(ProtocolTag::Mcp))
        .await
        .unwrap_err();
    assert_eq!(err.code, agw_error::ErrorCode::ParseError);
    assert_eq!(
        err.context.get("detail_code").unwrap(),
        &json!("MISSING_METHOD")
    );
}

#[tokio::test]
async fn undetectable_payload_is_unsupported() {
    let fx = fixture(GatewayConfig::default());
    let err = fx.gateway.process(b"{}", None).await.unwrap_err();
    assert_eq!(err.code, agw_error::ErrorCode::UnsupportedProtocol);
    assert!(err.suggestion.is_some());
}

#[tokio::test]
async fn low_confidence_decision_stops_at_the_approval_gate() {
    let mut config = GatewayConfig::default();
    config.router.similarity_threshold = 0.5;
    let fx = fixture(config);
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("edge", "borderline relevance"));

    let outcome = fx.gateway.process(&mcp_search_call(), None).await.unwrap();
    let ProcessOutcome::ApprovalPending { request, decision } = outcome else {
        panic!("expected approval gate");
    };
    assert!(decision.requires_approval);
    assert!(decision.approval_reason.as_deref().unwrap().contains('%'));

    // The pending entry renders as an approvable view.
    let pending = fx
        .gateway
        .audit()
        .query(&AuditFilter::for_trace(&request.metadata.trace_id))
        .into_iter()
        .find(|e| e.event_type == AuditEventType::HumanApprovalRequested)
        .expect("approval entry");
    let view = fx.gateway.views().generate(&pending, &[]);
    assert_eq!(view.title, "Approval Required");
    assert!(view.actions.contains(&ViewAction::Approve));

    // An approving review resumes execution.
    let result = fx
        .gateway
        .complete_review(
            &request,
            &decision,
            HumanReview {
                reviewer_id: "alice".into(),
                decision: ReviewDecision::Approved,
                timestamp: Utc::now(),
                comments: None,
                modifications: None,
            },
        )
        .await
        .unwrap()
        .expect("approved reviews execute");
    assert!(result.success);
}

#[tokio::test]
async fn rejected_review_executes_nothing() {
    let mut config = GatewayConfig::default();
    config.router.similarity_threshold = 0.5;
    let fx = fixture(config);
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("edge", "borderline relevance"));

    let ProcessOutcome::ApprovalPending { request, decision } =
        fx.gateway.process(&mcp_search_call(), None).await.unwrap()
    else {
        panic!("expected approval gate");
    };

    let result = fx
        .gateway
        .complete_review(
            &request,
            &decision,
            HumanReview {
                reviewer_id: "alice".into(),
                decision: ReviewDecision::Rejected,
                timestamp: Utc::now(),
                comments: Some("not this tool".into()),
                modifications: None,
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(fx.gateway.sandbox().stats().executions, 0);
}

#[tokio::test]
async fn no_match_carries_alternatives_in_context() {
    let fx = fixture(GatewayConfig::default());
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("mailer", "send email"));

    let err = fx.gateway.process(&mcp_search_call(), None).await.unwrap_err();
    assert_eq!(err.code, agw_error::ErrorCode::NoMatch);
    assert!(err.context.contains_key("alternative_0"));
}

#[tokio::test]
async fn missing_credential_blocks_execution() {
    let fx = fixture(GatewayConfig::default());
    let mut tool = ToolDefinition::new("web-search", "search the web");
    tool.required_credentials = vec!["search-api-key".into()];
    fx.gateway.catalog().register(tool);

    let err = fx.gateway.process(&mcp_search_call(), None).await.unwrap_err();
    assert_eq!(err.code, agw_error::ErrorCode::CredentialMissing);
    assert_eq!(fx.gateway.sandbox().stats().executions, 0);
}

#[tokio::test]
async fn resolved_credentials_reach_the_sandbox() {
    let fx = fixture(GatewayConfig::default());
    let mut tool = ToolDefinition::new("web-search", "search the web");
    tool.required_credentials = vec!["search-api-key".into()];
    fx.gateway.catalog().register(tool);
    fx.credentials.enroll("search-api-key", "k-123");
    fx.driver.register("web-search", |args| {
        Ok(json!({"key_seen": args["__credentials"]["search-api-key"].clone()}))
    });

    let ProcessOutcome::Executed { request, result, .. } =
        fx.gateway.process(&mcp_search_call(), None).await.unwrap()
    else {
        panic!("expected execution");
    };
    assert_eq!(result.output.unwrap()["key_seen"], json!("k-123"));

    fx.gateway.audit().flush().await;
    assert!(fx
        .sink
        .persisted()
        .iter()
        .any(|e| e.event_type == AuditEventType::CredentialAccessed
            && e.trace_id == request.metadata.trace_id));
}

#[tokio::test]
async fn failed_tool_is_audited_as_tool_failed() {
    let fx = fixture(GatewayConfig::default());
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("web-search", "search the web"));
    fx.driver.register("web-search", |_| {
        Err(agw_core::ExecutionFailure {
            code: "UPSTREAM_DOWN".into(),
            message: "search backend unreachable".into(),
            stdout: None,
            stderr: None,
            exit_code: None,
        })
    });

    let ProcessOutcome::Executed { result, .. } =
        fx.gateway.process(&mcp_search_call(), None).await.unwrap()
    else {
        panic!("expected execution outcome");
    };
    assert!(!result.success);
    assert_eq!(result.error.as_ref().unwrap().code, "UPSTREAM_DOWN");

    fx.gateway.audit().flush().await;
    assert!(fx
        .sink
        .persisted()
        .iter()
        .any(|e| e.event_type == AuditEventType::ToolFailed));
}

#[tokio::test]
async fn zero_deadline_times_out_and_still_commits_partial_audit() {
    let fx = fixture(GatewayConfig::default());
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("web-search", "search the web"));

    let err = fx
        .gateway
        .process_with_deadline(&mcp_search_call(), None, std::time::Duration::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.code, agw_error::ErrorCode::Timeout);

    fx.gateway.audit().flush().await;
    let entries = fx.sink.persisted();
    assert!(entries
        .iter()
        .any(|e| e.event_type == AuditEventType::RequestReceived));
    assert!(entries
        .iter()
        .any(|e| e.event_type == AuditEventType::IntentClassified));
}

#[tokio::test]
async fn second_request_hits_the_warm_pool() {
    let fx = fixture(GatewayConfig::default());
    fx.gateway
        .catalog()
        .register(ToolDefinition::new("web-search", "search the web"));

    for _ in 0..2 {
        let outcome = fx.gateway.process(&mcp_search_call(), None).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Executed { .. }));
    }
    let stats = fx.gateway.sandbox().stats();
    assert_eq!(stats.total_created, 1);
    assert_eq!(stats.executions, 2);
    assert!(stats.pool_hit_rate > 0.0);
}
