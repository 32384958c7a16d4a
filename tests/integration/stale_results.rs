//! Integration tests for discarding out-of-order results
//!
//! An execution started for an older environment may resolve after the host
//! has moved on; its result must never reach the rendered output.

use super::test_utils::{null_factory, payload, viewer_query, wait_until, GatedEngine};
use relay_host::error::ExecutionError;
use relay_host::{Outcome, Props, QueryHost, RenderSpec};
use serde_json::json;
use std::sync::Arc;

fn rendering_host(
    factory: &relay_host::EnvironmentFactory,
    engine: &Arc<GatedEngine>,
) -> QueryHost<String> {
    factory.create_host(
        engine.clone(),
        viewer_query(),
        RenderSpec::new()
            .with_success(|props: &Props| format!("viewer:{}", props["viewer"]))
            .with_error(|args| format!("error:{}", args.error))
            .with_loading(|_| "loading".to_string()),
    )
}

#[tokio::test]
async fn test_late_result_from_previous_environment_is_discarded() {
    let factory = null_factory();
    let engine = Arc::new(GatedEngine::default());
    let host = rendering_host(&factory, &engine);

    let first_gate = engine.gate(factory.current_environment().id());
    host.mount().unwrap();
    assert_eq!(host.render(), Some("loading".to_string()));

    let next = factory.refresh().unwrap();
    let second_gate = engine.gate(next.id());

    second_gate
        .send(Ok(payload("viewer", json!("fresh"))))
        .unwrap();
    assert_eq!(host.settled().await, Some("viewer:\"fresh\"".to_string()));

    first_gate
        .send(Ok(payload("viewer", json!("stale"))))
        .unwrap();
    wait_until(|| host.stats().discarded == 1).await;

    assert_eq!(host.render(), Some("viewer:\"fresh\"".to_string()));
    let stats = host.stats();
    assert_eq!(stats.started, 2);
    assert_eq!(stats.applied, 1);
}

#[tokio::test]
async fn test_late_error_does_not_replace_newer_loading_state() {
    let factory = null_factory();
    let engine = Arc::new(GatedEngine::default());
    let host = rendering_host(&factory, &engine);

    let first_gate = engine.gate(factory.current_environment().id());
    host.mount().unwrap();
    let next = factory.refresh().unwrap();
    let second_gate = engine.gate(next.id());

    first_gate
        .send(Err(ExecutionError::Transport("expired token".to_string())))
        .unwrap();
    wait_until(|| host.stats().discarded == 1).await;

    // Still waiting on the newer execution
    assert_eq!(host.snapshot().outcome, Outcome::Loading);
    assert_eq!(host.render(), Some("loading".to_string()));

    second_gate.send(Ok(payload("viewer", json!(7)))).unwrap();
    assert_eq!(host.settled().await, Some("viewer:7".to_string()));
    assert_eq!(host.snapshot().environment, Some(next.id()));
}

#[tokio::test]
async fn test_result_after_unmount_is_ignored() {
    let factory = null_factory();
    let engine = Arc::new(GatedEngine::default());
    let host = rendering_host(&factory, &engine);

    let gate = engine.gate(factory.current_environment().id());
    host.mount().unwrap();
    host.unmount();

    gate.send(Ok(payload("viewer", json!("late")))).unwrap();
    wait_until(|| host.stats().discarded == 1).await;
    assert_eq!(host.render(), None);
}
