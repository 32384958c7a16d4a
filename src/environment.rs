//! Environment handles
//!
//! An environment is one configured data-fetch context: the network used to
//! reach the backend plus whatever credentials that network carries. Handles are
//! immutable; a refresh produces a brand-new environment rather than editing
//! the old one.

use crate::error::ProviderError;
use crate::fetch::Network;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide identity of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentId(u64);

impl EnvironmentId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        EnvironmentId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env-{}", self.0)
    }
}

pub struct Environment {
    id: EnvironmentId,
    label: String,
    created_at: DateTime<Utc>,
    network: Arc<dyn Network>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("created_at", &self.created_at)
            .field("network", &self.network.name())
            .finish()
    }
}

/// Shared, immutable reference to an environment.
///
/// Equality is identity: two handles are equal only if they point at the same
/// environment instance.
#[derive(Clone, Debug)]
pub struct EnvironmentHandle(Arc<Environment>);

impl EnvironmentHandle {
    pub fn new(label: impl Into<String>, network: Arc<dyn Network>) -> Self {
        Self(Arc::new(Environment {
            id: EnvironmentId::next(),
            label: label.into(),
            created_at: Utc::now(),
            network,
        }))
    }

    pub fn id(&self) -> EnvironmentId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.0.network
    }
}

impl PartialEq for EnvironmentHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EnvironmentHandle {}

/// Produces a fresh environment on every call.
///
/// Must be safe to call repeatedly and must never modify handles it returned
/// earlier.
pub trait EnvironmentProvider: Send + Sync {
    fn provide(&self) -> Result<EnvironmentHandle, ProviderError>;
}

impl<F> EnvironmentProvider for F
where
    F: Fn() -> Result<EnvironmentHandle, ProviderError> + Send + Sync,
{
    fn provide(&self) -> Result<EnvironmentHandle, ProviderError> {
        self()
    }
}
