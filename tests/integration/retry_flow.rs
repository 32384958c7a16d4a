//! Integration tests for retry and refresh_renderer
//!
//! Tests cover:
//! - refresh_renderer bumping the generation by exactly one
//! - Retrying from the error view with an identical request

use super::test_utils::{
    null_factory, payload, viewer_query, wait_until, Execution, RecordingEngine,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_host::engine::ExecutionResult;
use relay_host::error::ExecutionError;
use relay_host::{EnvironmentHandle, QueryDescriptor, QueryEngine, RenderSpec, RetryHandle};
use serde_json::json;
use std::sync::Arc;

/// Fails the first execution, succeeds afterwards
#[derive(Default)]
struct FailOnceEngine {
    calls: Mutex<Vec<Execution>>,
}

#[async_trait]
impl QueryEngine for FailOnceEngine {
    async fn execute(
        &self,
        environment: &EnvironmentHandle,
        descriptor: &QueryDescriptor,
    ) -> ExecutionResult {
        let mut calls = self.calls.lock();
        calls.push(Execution {
            environment: environment.id(),
            descriptor: descriptor.clone(),
        });
        if calls.len() == 1 {
            Err(ExecutionError::Transport("connection reset".to_string()))
        } else {
            Ok(payload("viewer", json!({ "id": 1 })))
        }
    }
}

#[derive(Debug)]
enum View {
    Failed(String, RetryHandle),
    Ready(String),
}

#[tokio::test]
async fn test_retry_from_error_view_reruns_identical_request() {
    let factory = null_factory();
    let engine = Arc::new(FailOnceEngine::default());
    let descriptor = viewer_query().with_variable("first", json!(10));
    let host = factory.create_host(
        engine.clone(),
        descriptor.clone(),
        RenderSpec::new()
            .with_success(|props| View::Ready(props["viewer"].to_string()))
            .with_error(|args| View::Failed(args.error.to_string(), args.retry)),
    );
    host.mount().unwrap();

    let generation = host.generation();
    let retry = match host.settled().await {
        Some(View::Failed(message, retry)) => {
            assert_eq!(message, "Transport error: connection reset");
            retry
        }
        other => panic!("expected error view, got {:?}", other),
    };

    retry.retry();
    assert_eq!(host.generation(), generation + 1);
    match host.settled().await {
        Some(View::Ready(viewer)) => assert_eq!(viewer, r#"{"id":1}"#),
        other => panic!("expected success view, got {:?}", other),
    }

    let calls = engine.calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
    assert_eq!(calls[1].descriptor, descriptor);
    assert_eq!(calls[1].environment, factory.current_environment().id());
}

#[tokio::test]
async fn test_refresh_renderer_increments_generation_by_one() {
    let factory = null_factory();
    let engine = Arc::new(RecordingEngine::default());
    let host = factory.create_host(
        engine.clone(),
        viewer_query(),
        RenderSpec::new().with_success(|props| props["environment"].as_u64()),
    );
    host.mount().unwrap();

    for _ in 0..3 {
        let generation = host.generation();
        let environment = host.environment();
        let descriptor = host.descriptor();

        let next = host.refresh_renderer();
        assert_eq!(next, generation + 1);
        assert_eq!(host.generation(), generation + 1);
        assert_eq!(host.environment(), environment);
        assert_eq!(host.descriptor(), descriptor);
    }

    let environment = factory.current_environment().id().as_u64();
    assert_eq!(host.settled().await, Some(Some(environment)));
    wait_until(|| host.stats().discarded == 3).await;
    assert_eq!(engine.executions().len(), 4);
    assert_eq!(host.stats().applied, 1);
}
