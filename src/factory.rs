//! Environment factory
//!
//! Owns the one live environment and the registry of hosts interested in it.
//! `refresh()` asks the provider for a new environment, makes it current, and
//! broadcasts it to every mounted host. A failed provider call changes nothing.

use crate::engine::{ExecutionResult, QueryEngine};
use crate::environment::{EnvironmentHandle, EnvironmentProvider};
use crate::error::{ExecutionError, ProviderError, RefreshError};
use crate::host::QueryHost;
use crate::operation::QueryDescriptor;
use crate::registry::{EnvironmentCallback, SubscriberId, SubscriberRegistry};
use crate::render::RenderSpec;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

pub(crate) struct FactoryShared {
    provider: Box<dyn EnvironmentProvider>,
    /// Written only together with taking a broadcast snapshot
    current: Mutex<EnvironmentHandle>,
    registry: SubscriberRegistry,
    /// Serializes refreshes; reentrant so a subscriber may refresh again
    refreshing: ReentrantMutex<()>,
    refreshes: AtomicU64,
}

impl FactoryShared {
    pub(crate) fn current(&self) -> EnvironmentHandle {
        self.current.lock().clone()
    }

    pub(crate) fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Read the current environment and register in one step, so a concurrent
    /// refresh either includes the new subscriber or is already visible to it.
    pub(crate) fn subscribe(
        &self,
        callback: EnvironmentCallback,
    ) -> (SubscriberId, EnvironmentHandle) {
        let current = self.current.lock();
        let id = self.registry.register(callback);
        (id, current.clone())
    }

    fn refresh(&self) -> Result<EnvironmentHandle, RefreshError> {
        let _serial = self.refreshing.lock();

        let next = self.provider.provide().map_err(|source| {
            let current = self.current().id();
            error!(environment = %current, error = %source, "Environment provider failed");
            RefreshError::Provider { current, source }
        })?;

        let (previous, pending) = {
            let mut current = self.current.lock();
            let previous = std::mem::replace(&mut *current, next.clone());
            (previous, self.registry.begin_broadcast())
        };
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            previous = %previous.id(),
            environment = %next.id(),
            subscribers = pending.len(),
            "Refreshed environment"
        );
        self.registry.deliver(pending, &next);
        Ok(next)
    }
}

/// Produces query hosts bound to one swappable environment
pub struct EnvironmentFactory {
    shared: Arc<FactoryShared>,
}

impl EnvironmentFactory {
    /// Create the factory, calling the provider once for the initial environment
    pub fn new(provider: impl EnvironmentProvider + 'static) -> Result<Self, ProviderError> {
        let initial = provider.provide()?;
        debug!(environment = %initial.id(), "Created environment factory");
        Ok(Self {
            shared: Arc::new(FactoryShared {
                provider: Box::new(provider),
                current: Mutex::new(initial),
                registry: SubscriberRegistry::new(),
                refreshing: ReentrantMutex::new(()),
                refreshes: AtomicU64::new(0),
            }),
        })
    }

    pub fn current_environment(&self) -> EnvironmentHandle {
        self.shared.current()
    }

    /// Replace the current environment and broadcast it to mounted hosts.
    ///
    /// Returns the new environment. On provider failure the previous
    /// environment stays current and nothing is broadcast.
    pub fn refresh(&self) -> Result<EnvironmentHandle, RefreshError> {
        self.shared.refresh()
    }

    /// Read-only view of the mounted hosts' registrations
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.shared.registry
    }

    /// Number of successful refreshes
    pub fn refresh_count(&self) -> u64 {
        self.shared.refreshes.load(Ordering::Relaxed)
    }

    pub fn access(&self) -> EnvironmentAccess {
        EnvironmentAccess {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Create an unmounted host for `descriptor`
    pub fn create_host<V: 'static>(
        &self,
        engine: Arc<dyn QueryEngine>,
        descriptor: QueryDescriptor,
        spec: RenderSpec<V>,
    ) -> QueryHost<V> {
        QueryHost::new(Arc::downgrade(&self.shared), engine, descriptor, spec)
    }
}

/// What a host hands to its descendants: read the environment, refresh it, or
/// commit a mutation against it.
///
/// Holds the factory weakly, so it never keeps a torn-down factory alive.
#[derive(Clone)]
pub struct EnvironmentAccess {
    shared: Weak<FactoryShared>,
}

impl EnvironmentAccess {
    pub(crate) fn from_weak(shared: Weak<FactoryShared>) -> Self {
        Self { shared }
    }

    /// The factory's current environment, or `None` once it is gone
    pub fn current(&self) -> Option<EnvironmentHandle> {
        self.shared.upgrade().map(|shared| shared.current())
    }

    pub fn refresh(&self) -> Result<EnvironmentHandle, RefreshError> {
        self.shared
            .upgrade()
            .ok_or(RefreshError::FactoryDropped)?
            .refresh()
    }

    /// Run a mutation against the factory's current environment (not a host's
    /// possibly older copy).
    pub async fn commit_mutation(
        &self,
        engine: &dyn QueryEngine,
        mutation: &QueryDescriptor,
    ) -> ExecutionResult {
        if !mutation.is_mutation() {
            return Err(ExecutionError::InvalidOperation(format!(
                "{} is not a mutation",
                mutation.name
            )));
        }
        let environment = self.current().ok_or_else(|| {
            ExecutionError::NoEnvironment("environment factory has been dropped".to_string())
        })?;
        debug!(
            operation = %mutation.name,
            environment = %environment.id(),
            "Committing mutation"
        );
        engine.execute(&environment, mutation).await
    }
}
