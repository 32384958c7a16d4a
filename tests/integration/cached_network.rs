//! Integration tests for the response cache behind hosts
//!
//! Each environment owns its own cache, so a refresh starts cold.

use super::test_utils::viewer_query;
use async_trait::async_trait;
use relay_host::error::{FetchError, ProviderError};
use relay_host::fetch::{CacheConfig, CachedNetwork, FetchOptions, Network, Uploadables};
use relay_host::{
    EnvironmentFactory, EnvironmentHandle, NetworkQueryEngine, Props, QueryDescriptor,
    RenderSpec,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingNetwork {
    requests: Arc<AtomicUsize>,
}

#[async_trait]
impl Network for CountingNetwork {
    async fn fetch(
        &self,
        _descriptor: &QueryDescriptor,
        _options: FetchOptions,
        _uploadables: Option<&Uploadables>,
    ) -> Result<Value, FetchError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "data": { "request": n } }))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn cached_factory(requests: &Arc<AtomicUsize>) -> EnvironmentFactory {
    let requests = Arc::clone(requests);
    EnvironmentFactory::new(move || -> Result<EnvironmentHandle, ProviderError> {
        let network = CachedNetwork::new(
            CountingNetwork {
                requests: Arc::clone(&requests),
            },
            CacheConfig {
                enabled: true,
                ..CacheConfig::default()
            },
        );
        Ok(EnvironmentHandle::new("cached", Arc::new(network)))
    })
    .unwrap()
}

fn request_spec() -> RenderSpec<u64> {
    RenderSpec::new().with_success(|props: &Props| props["request"].as_u64().unwrap_or_default())
}

#[tokio::test]
async fn test_hosts_share_cached_response_within_environment() {
    let requests = Arc::new(AtomicUsize::new(0));
    let factory = cached_factory(&requests);
    let engine = Arc::new(NetworkQueryEngine::new());

    let first = factory.create_host(engine.clone(), viewer_query(), request_spec());
    first.mount().unwrap();
    assert_eq!(first.settled().await, Some(1));

    let second = factory.create_host(engine.clone(), viewer_query(), request_spec());
    second.mount().unwrap();
    assert_eq!(second.settled().await, Some(1));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    // Forced fetches bypass the cache
    let forced = factory.create_host(
        Arc::new(NetworkQueryEngine::new().with_options(FetchOptions::forced())),
        viewer_query(),
        request_spec(),
    );
    forced.mount().unwrap();
    assert_eq!(forced.settled().await, Some(2));
}

#[tokio::test]
async fn test_refresh_starts_with_cold_cache() {
    let requests = Arc::new(AtomicUsize::new(0));
    let factory = cached_factory(&requests);
    let host = factory.create_host(
        Arc::new(NetworkQueryEngine::new()),
        viewer_query(),
        request_spec(),
    );
    host.mount().unwrap();
    assert_eq!(host.settled().await, Some(1));

    factory.refresh().unwrap();
    assert_eq!(host.settled().await, Some(2));
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mutation_clears_environment_cache() {
    let requests = Arc::new(AtomicUsize::new(0));
    let factory = cached_factory(&requests);
    let engine = Arc::new(NetworkQueryEngine::new());
    let host = factory.create_host(engine.clone(), viewer_query(), request_spec());
    host.mount().unwrap();
    assert_eq!(host.settled().await, Some(1));

    let mutation = QueryDescriptor::mutation("Touch", "mutation Touch { touch }");
    host.access()
        .commit_mutation(engine.as_ref(), &mutation)
        .await
        .unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 2);

    host.refresh_renderer();
    assert_eq!(host.settled().await, Some(3));
}
