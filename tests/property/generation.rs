//! Property-based tests for host generation bookkeeping

use proptest::prelude::*;
use relay_host::engine::ExecutionResult;
use relay_host::error::{FetchError, ProviderError};
use relay_host::fetch::{FetchOptions, Network, Uploadables};
use relay_host::host::INITIAL_GENERATION;
use relay_host::{
    EnvironmentFactory, EnvironmentHandle, Props, QueryDescriptor, QueryEngine, RenderSpec,
};
use serde_json::Value;
use std::sync::Arc;

struct NullNetwork;

#[async_trait::async_trait]
impl Network for NullNetwork {
    async fn fetch(
        &self,
        _descriptor: &QueryDescriptor,
        _options: FetchOptions,
        _uploadables: Option<&Uploadables>,
    ) -> Result<Value, FetchError> {
        Ok(Value::Null)
    }

    fn name(&self) -> &str {
        "null"
    }
}

struct EmptyEngine;

#[async_trait::async_trait]
impl QueryEngine for EmptyEngine {
    async fn execute(
        &self,
        _environment: &EnvironmentHandle,
        _descriptor: &QueryDescriptor,
    ) -> ExecutionResult {
        Ok(Props::new())
    }
}

#[derive(Debug, Clone)]
enum HostOp {
    Mount,
    Unmount,
    RefreshEnvironment,
    RefreshRenderer,
}

fn host_op() -> impl Strategy<Value = HostOp> {
    prop_oneof![
        Just(HostOp::Mount),
        Just(HostOp::Unmount),
        Just(HostOp::RefreshEnvironment),
        Just(HostOp::RefreshRenderer),
    ]
}

/// The generation moves by exactly one per restart and never otherwise
#[test]
fn test_generation_advances_once_per_restart_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(host_op(), 0..40), |ops| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let _entered = runtime.enter();

            let factory = EnvironmentFactory::new(|| -> Result<EnvironmentHandle, ProviderError> {
                Ok(EnvironmentHandle::new("prop", Arc::new(NullNetwork)))
            })
            .unwrap();
            let host = factory.create_host(
                Arc::new(EmptyEngine),
                QueryDescriptor::query("Q", "query Q { a }"),
                RenderSpec::<()>::new(),
            );

            let mut expected = INITIAL_GENERATION;
            let mut mounted = false;
            let mut ever_mounted = false;

            for op in ops {
                match op {
                    HostOp::Mount => {
                        host.mount().unwrap();
                        if !mounted {
                            if ever_mounted {
                                expected += 1;
                            }
                            mounted = true;
                            ever_mounted = true;
                        }
                    }
                    HostOp::Unmount => {
                        prop_assert_eq!(host.unmount(), mounted);
                        mounted = false;
                    }
                    HostOp::RefreshEnvironment => {
                        factory.refresh().unwrap();
                        if mounted {
                            expected += 1;
                            prop_assert_eq!(
                                host.environment(),
                                Some(factory.current_environment())
                            );
                        }
                    }
                    HostOp::RefreshRenderer => {
                        expected += 1;
                        prop_assert_eq!(host.refresh_renderer(), expected);
                    }
                }
                prop_assert_eq!(host.generation(), expected);
                prop_assert_eq!(factory.registry().len(), usize::from(mounted));
            }
            Ok(())
        })
        .unwrap();
}
