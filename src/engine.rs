//! Query-execution collaborator
//!
//! Runs one operation against one environment and reduces the response to
//! either a payload or an `ExecutionError`. Errors are returned as values;
//! nothing here panics or retries.

use crate::environment::EnvironmentHandle;
use crate::error::ExecutionError;
use crate::fetch::{FetchOptions, Uploadables};
use crate::operation::QueryDescriptor;
use crate::render::Props;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub type ExecutionResult = Result<Props, ExecutionError>;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(
        &self,
        environment: &EnvironmentHandle,
        descriptor: &QueryDescriptor,
    ) -> ExecutionResult;
}

/// Executes operations through the environment's network
#[derive(Debug, Clone, Default)]
pub struct NetworkQueryEngine {
    options: FetchOptions,
    uploadables: Option<Uploadables>,
}

impl NetworkQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Send these uploads with every operation (multipart requests)
    pub fn with_uploadables(mut self, uploadables: Uploadables) -> Self {
        self.uploadables = Some(uploadables);
        self
    }
}

#[async_trait]
impl QueryEngine for NetworkQueryEngine {
    async fn execute(
        &self,
        environment: &EnvironmentHandle,
        descriptor: &QueryDescriptor,
    ) -> ExecutionResult {
        debug!(
            operation = %descriptor.name,
            environment = %environment.id(),
            network = environment.network().name(),
            "Executing operation"
        );
        let response = environment
            .network()
            .fetch(descriptor, self.options, self.uploadables.as_ref())
            .await?;
        parse_response(response)
    }
}

/// Reduce a GraphQL response body to a payload or an error
pub fn parse_response(response: Value) -> ExecutionResult {
    let Value::Object(mut body) = response else {
        warn!("Response body is not a JSON object");
        return Err(ExecutionError::MissingData);
    };

    if let Some(Value::Array(errors)) = body.get("errors") {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|error| match error.get("message").and_then(Value::as_str) {
                    Some(message) => message.to_string(),
                    None => error.to_string(),
                })
                .collect();
            return Err(ExecutionError::Graphql(messages));
        }
    }

    match body.remove("data") {
        Some(Value::Object(data)) => Ok(data),
        _ => Err(ExecutionError::MissingData),
    }
}
