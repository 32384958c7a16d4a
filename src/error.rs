//! Error types for the relay host.
//!
//! Provider and environment failures propagate to whoever asked for the
//! refresh. Query failures are data: `ExecutionError` is cloneable so it can be
//! handed to views instead of unwinding through the host.

use crate::environment::EnvironmentId;
use thiserror::Error;

/// Failure raised by an environment provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Environment provider failed: {0}")]
    Failed(String),

    #[error("Environment provider is missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Environment provider could not build a network: {0}")]
    Network(#[from] FetchError),
}

/// Errors surfaced to the caller of `refresh()`
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Refresh failed, environment {current} remains live: {source}")]
    Provider {
        current: EnvironmentId,
        #[source]
        source: ProviderError,
    },

    #[error("Environment factory has been dropped")]
    FactoryDropped,
}

/// Errors raised while mounting a query host
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Environment factory has been dropped")]
    FactoryDropped,

    #[error("Query host must be mounted inside a tokio runtime")]
    NoRuntime,
}

/// Transport-level failures of the fetch collaborator
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else if error.is_timeout() {
            FetchError::Timeout(error.to_string())
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else if error.is_decode() {
            FetchError::Decode(error.to_string())
        } else {
            FetchError::Http(error.to_string())
        }
    }
}

/// Query execution failures, delivered to views as values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("GraphQL errors: {}", .0.join("; "))]
    Graphql(Vec<String>),

    #[error("Response contained no data")]
    MissingData,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No live environment: {0}")]
    NoEnvironment(String),
}

impl From<FetchError> for ExecutionError {
    fn from(err: FetchError) -> Self {
        ExecutionError::Transport(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration validation failed:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
