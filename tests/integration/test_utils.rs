//! Shared test utilities for integration tests
//!
//! Networks, engines and providers that let tests control when and how an
//! execution finishes.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_host::engine::ExecutionResult;
use relay_host::error::{ExecutionError, FetchError, ProviderError};
use relay_host::fetch::{FetchOptions, Network, Uploadables};
use relay_host::{
    EnvironmentFactory, EnvironmentHandle, EnvironmentId, Props, QueryDescriptor, QueryEngine,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub struct NullNetwork;

#[async_trait]
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

pub fn null_environment(label: &str) -> EnvironmentHandle {
    EnvironmentHandle::new(label, Arc::new(NullNetwork))
}

/// Factory whose provider hands out a fresh null environment on every call
pub fn null_factory() -> EnvironmentFactory {
    EnvironmentFactory::new(|| -> Result<EnvironmentHandle, ProviderError> {
        Ok(null_environment("test"))
    })
    .unwrap()
}

/// Factory whose provider fails while the returned flag is set
pub fn switchable_factory() -> (EnvironmentFactory, Arc<AtomicBool>) {
    let fail = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fail);
    let factory = EnvironmentFactory::new(move || -> Result<EnvironmentHandle, ProviderError> {
        if flag.load(Ordering::SeqCst) {
            Err(ProviderError::Failed("identity service unavailable".to_string()))
        } else {
            Ok(null_environment("switchable"))
        }
    })
    .unwrap();
    (factory, fail)
}

/// One recorded execution
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub environment: EnvironmentId,
    pub descriptor: QueryDescriptor,
}

/// Answers with the environment id and records every call
#[derive(Default)]
pub struct RecordingEngine {
    pub calls: Mutex<Vec<Execution>>,
}

impl RecordingEngine {
    pub fn executions(&self) -> Vec<Execution> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QueryEngine for RecordingEngine {
    async fn execute(
        &self,
        environment: &EnvironmentHandle,
        descriptor: &QueryDescriptor,
    ) -> ExecutionResult {
        self.calls.lock().push(Execution {
            environment: environment.id(),
            descriptor: descriptor.clone(),
        });
        let mut props = Props::new();
        props.insert("environment".to_string(), json!(environment.id().as_u64()));
        Ok(props)
    }
}

/// Engine whose executions finish only when the test releases the gate for
/// their environment
#[derive(Default)]
pub struct GatedEngine {
    gates: Mutex<HashMap<EnvironmentId, oneshot::Receiver<ExecutionResult>>>,
}

impl GatedEngine {
    pub fn gate(&self, environment: EnvironmentId) -> oneshot::Sender<ExecutionResult> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(environment, rx);
        tx
    }
}

#[async_trait]
impl QueryEngine for GatedEngine {
    async fn execute(
        &self,
        environment: &EnvironmentHandle,
        _descriptor: &QueryDescriptor,
    ) -> ExecutionResult {
        let gate = self.gates.lock().remove(&environment.id());
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or(Err(ExecutionError::Transport("gate dropped".to_string()))),
            None => Err(ExecutionError::Transport("no gate".to_string())),
        }
    }
}

pub fn payload(key: &str, value: Value) -> Props {
    let mut props = Props::new();
    props.insert(key.to_string(), value);
    props
}

pub fn viewer_query() -> QueryDescriptor {
    QueryDescriptor::query("Viewer", "query Viewer { viewer { id } }")
}

/// Yield to spawned executions until `done` holds, failing after a few seconds
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Serializes tests that point the config loader at temporary directories
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variable state to restore after a config test
struct ConfigEnvState {
    vars: Vec<(String, Option<String>)>,
}

impl ConfigEnvState {
    fn capture() -> Self {
        let mut names = vec![
            "HOME".to_string(),
            "XDG_CONFIG_HOME".to_string(),
            "RELAY_HOST_ENV".to_string(),
        ];
        names.extend(
            std::env::vars()
                .map(|(name, _)| name)
                .filter(|name| name.starts_with("RELAY_HOST__")),
        );
        Self {
            vars: names
                .into_iter()
                .map(|name| {
                    let value = std::env::var(&name).ok();
                    (name, value)
                })
                .collect(),
        }
    }
}

impl Drop for ConfigEnvState {
    fn drop(&mut self) {
        // Drop overrides set during the test, then put back what was there
        for (name, _) in std::env::vars() {
            if name.starts_with("RELAY_HOST__") {
                std::env::remove_var(&name);
            }
        }
        for (name, value) in self.vars.drain(..) {
            match value {
                Some(value) => std::env::set_var(&name, value),
                None => std::env::remove_var(&name),
            }
        }
    }
}

/// Run `f` with the global config directory inside `test_dir` and no
/// `RELAY_HOST__*` overrides, restoring the environment afterwards (also when
/// `f` panics).
///
/// The global config file resolves to `test_dir/relay-host/config.toml`.
pub fn with_config_home<F, R>(test_dir: &tempfile::TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = ConfigEnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    std::env::remove_var("RELAY_HOST_ENV");
    for (name, _) in &env_state.vars {
        if name.starts_with("RELAY_HOST__") {
            std::env::remove_var(name);
        }
    }

    let result = f();
    drop(env_state);
    result
}
