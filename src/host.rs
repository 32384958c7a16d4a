//! Query host
//!
//! A mountable unit that follows the factory's environment. Mounting registers
//! with the factory and starts the executor; every broadcast environment, and
//! every local `refresh_renderer()`, bumps the generation by one and restarts
//! the executor. Unmounting (or dropping the host) unregisters.

use crate::engine::QueryEngine;
use crate::environment::EnvironmentHandle;
use crate::error::HostError;
use crate::executor::{ExecutionSnapshot, ExecutorStatsSnapshot, QueryExecutor, IDLE_GENERATION};
use crate::factory::{EnvironmentAccess, FactoryShared};
use crate::operation::{QueryDescriptor, Variables};
use crate::registry::{EnvironmentCallback, SubscriberId};
use crate::render::{RenderSpec, RetryHandle};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// First generation of a freshly created host
pub const INITIAL_GENERATION: u64 = 1;

struct HostState {
    descriptor: QueryDescriptor,
    environment: Option<EnvironmentHandle>,
    generation: u64,
    subscription: Option<SubscriberId>,
    runtime: Option<Handle>,
    mounts: u64,
}

impl HostState {
    fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }
}

struct HostInner<V> {
    factory: Weak<FactoryShared>,
    executor: QueryExecutor<V>,
    state: Mutex<HostState>,
}

impl<V: 'static> HostInner<V> {
    fn mount(self: &Arc<Self>) -> Result<(), HostError> {
        let factory = self.factory.upgrade().ok_or(HostError::FactoryDropped)?;
        let runtime = Handle::try_current().map_err(|_| HostError::NoRuntime)?;

        let mut state = self.state.lock();
        if state.is_mounted() {
            trace!("Host already mounted");
            return Ok(());
        }

        if self.executor.spec().has_conflict() {
            warn!(
                operation = %state.descriptor.name,
                "Host has a render function and success, error or loading views; \
                 only the render function is used"
            );
        }

        let weak = Arc::downgrade(self);
        let callback: EnvironmentCallback = Arc::new(move |handle: EnvironmentHandle| {
            match weak.upgrade() {
                Some(inner) => inner.apply_environment(handle),
                None => warn!("Environment delivered to a dropped host"),
            }
        });
        let (id, environment) = factory.subscribe(callback);

        // A remount must not accept results started before the unmount
        if state.mounts > 0 {
            state.generation += 1;
        }
        state.mounts += 1;
        state.subscription = Some(id);
        state.environment = Some(environment.clone());
        state.runtime = Some(runtime.clone());

        debug!(
            subscriber = %id,
            environment = %environment.id(),
            generation = state.generation,
            "Mounted query host"
        );
        self.executor.start(
            &runtime,
            state.generation,
            environment,
            state.descriptor.clone(),
        );
        Ok(())
    }

    fn unmount(&self) -> bool {
        let mut state = self.state.lock();
        let Some(id) = state.subscription.take() else {
            return false;
        };
        match self.factory.upgrade() {
            Some(factory) => {
                factory.registry().unregister(id);
            }
            None => debug!(subscriber = %id, "Factory already dropped at unmount"),
        }
        self.executor.retire();
        debug!(subscriber = %id, "Unmounted query host");
        true
    }

    fn apply_environment(&self, handle: EnvironmentHandle) {
        let mut state = self.state.lock();
        if !state.is_mounted() {
            trace!(environment = %handle.id(), "Ignoring environment for unmounted host");
            return;
        }
        if state.environment.as_ref() == Some(&handle) {
            trace!(environment = %handle.id(), "Host already on this environment");
            return;
        }
        state.environment = Some(handle);
        state.generation += 1;
        self.restart(&state);
    }

    fn refresh_renderer(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        self.restart(&state);
        state.generation
    }

    fn set_variables(&self, variables: Variables) -> bool {
        let mut state = self.state.lock();
        if state.descriptor.variables == variables {
            return false;
        }
        state.descriptor.variables = variables;
        state.generation += 1;
        self.restart(&state);
        true
    }

    fn restart(&self, state: &HostState) {
        if !state.is_mounted() {
            return;
        }
        if let (Some(runtime), Some(environment)) = (&state.runtime, &state.environment) {
            self.executor.start(
                runtime,
                state.generation,
                environment.clone(),
                state.descriptor.clone(),
            );
        }
    }
}

impl<V> Drop for HostInner<V> {
    fn drop(&mut self) {
        if let Some(id) = self.state.get_mut().subscription.take() {
            if let Some(factory) = self.factory.upgrade() {
                factory.registry().unregister(id);
                debug!(subscriber = %id, "Unregistered dropped query host");
            }
        }
    }
}

/// Mountable query host bound to one factory
pub struct QueryHost<V> {
    inner: Arc<HostInner<V>>,
}

impl<V: 'static> QueryHost<V> {
    pub(crate) fn new(
        factory: Weak<FactoryShared>,
        engine: Arc<dyn QueryEngine>,
        descriptor: QueryDescriptor,
        spec: RenderSpec<V>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<HostInner<V>>| {
            let weak = weak.clone();
            let retry = RetryHandle::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh_renderer();
                }
            });
            HostInner {
                factory,
                executor: QueryExecutor::new(engine, spec, retry),
                state: Mutex::new(HostState {
                    descriptor,
                    environment: None,
                    generation: INITIAL_GENERATION,
                    subscription: None,
                    runtime: None,
                    mounts: 0,
                }),
            }
        });
        Self { inner }
    }

    /// Register with the factory, adopt its current environment, and start
    /// executing. Mounting a mounted host does nothing.
    ///
    /// Must be called from within a tokio runtime; executions are spawned on it.
    pub fn mount(&self) -> Result<(), HostError> {
        self.inner.mount()
    }

    /// Unregister from the factory and drop any in-flight results. Safe to call
    /// repeatedly and after the factory is gone. Returns whether the host was
    /// mounted.
    pub fn unmount(&self) -> bool {
        self.inner.unmount()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state.lock().is_mounted()
    }

    /// Restart execution with the same environment and query. Returns the new
    /// generation.
    pub fn refresh_renderer(&self) -> u64 {
        self.inner.refresh_renderer()
    }

    /// Replace the query variables, restarting if they changed
    pub fn set_variables(&self, variables: Variables) -> bool {
        self.inner.set_variables(variables)
    }

    /// Environment as of the last broadcast this host received
    pub fn environment(&self) -> Option<EnvironmentHandle> {
        self.inner.state.lock().environment.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.inner.state.lock().subscription
    }

    pub fn descriptor(&self) -> QueryDescriptor {
        self.inner.state.lock().descriptor.clone()
    }

    /// Environment accessors for code rendered inside this host
    pub fn access(&self) -> EnvironmentAccess {
        EnvironmentAccess::from_weak(self.inner.factory.clone())
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.inner.executor.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.inner.executor.subscribe()
    }

    pub fn stats(&self) -> ExecutorStatsSnapshot {
        self.inner.executor.stats()
    }

    /// Render the executor's current outcome
    pub fn render(&self) -> Option<V> {
        self.inner.executor.render()
    }

    /// Wait until the current generation has an outcome, then render it.
    ///
    /// Resolves to `None` right away for a host that is not mounted, and as
    /// soon as the host is unmounted while waiting.
    pub async fn settled(&self) -> Option<V> {
        let mut updates = self.subscribe();
        let waited = updates
            .wait_for(|snapshot| snapshot.generation == IDLE_GENERATION || snapshot.is_settled())
            .await
            .map(|snapshot| snapshot.generation == IDLE_GENERATION);
        match waited {
            Ok(false) => self.render(),
            Ok(true) => {
                trace!("Host is not executing, nothing to settle");
                None
            }
            Err(_) => None,
        }
    }
}
