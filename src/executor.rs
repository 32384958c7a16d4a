//! Query executor
//!
//! Runs the host's query and keeps the latest outcome. Every execution is
//! stamped with the generation it was started for; when a result comes back
//! it is applied only if that generation is still current. Older executions
//! are left to finish on their own and their results are dropped, which is
//! how a restart "cancels" work that is already in flight.

use crate::engine::{ExecutionResult, QueryEngine};
use crate::environment::{EnvironmentHandle, EnvironmentId};
use crate::operation::QueryDescriptor;
use crate::render::{Outcome, RenderSpec, RetryHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Generation value of an executor that is not running anything
pub const IDLE_GENERATION: u64 = 0;

/// What the executor currently shows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionSnapshot {
    pub generation: u64,
    pub environment: Option<EnvironmentId>,
    pub outcome: Outcome,
}

impl ExecutionSnapshot {
    /// An outcome other than loading has been applied for this generation
    pub fn is_settled(&self) -> bool {
        self.generation != IDLE_GENERATION && !self.outcome.is_loading()
    }
}

#[derive(Default)]
struct ExecutorStats {
    started: AtomicU64,
    applied: AtomicU64,
    discarded: AtomicU64,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorStatsSnapshot {
    pub started: u64,
    pub applied: u64,
    pub discarded: u64,
}

struct ExecutorShared {
    state: watch::Sender<ExecutionSnapshot>,
    stats: ExecutorStats,
}

impl ExecutorShared {
    /// Apply `result` if `generation` is still current. Returns whether it was applied.
    fn complete(&self, generation: u64, result: ExecutionResult) -> bool {
        let outcome = match result {
            Ok(props) => Outcome::Success(props),
            Err(err) => Outcome::Failed(err),
        };

        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.generation == generation {
                snapshot.outcome = outcome;
                true
            } else {
                false
            }
        });

        if applied {
            self.stats.applied.fetch_add(1, Ordering::Relaxed);
            trace!(generation, "Applied execution result");
        } else {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                generation,
                current = self.state.borrow().generation,
                "Discarded stale execution result"
            );
        }
        applied
    }
}

/// Executes one query at a time for a host and renders its outcome
pub struct QueryExecutor<V> {
    shared: Arc<ExecutorShared>,
    engine: Arc<dyn QueryEngine>,
    spec: RenderSpec<V>,
    retry: RetryHandle,
}

impl<V> QueryExecutor<V> {
    pub fn new(engine: Arc<dyn QueryEngine>, spec: RenderSpec<V>, retry: RetryHandle) -> Self {
        let (state, _) = watch::channel(ExecutionSnapshot::default());
        Self {
            shared: Arc::new(ExecutorShared {
                state,
                stats: ExecutorStats::default(),
            }),
            engine,
            spec,
            retry,
        }
    }

    /// Restart execution for `generation`.
    ///
    /// Anything still running for an earlier generation keeps running, but its
    /// result will be discarded. Starting the generation that is already
    /// current does nothing and returns `None`.
    pub fn start(
        &self,
        runtime: &Handle,
        generation: u64,
        environment: EnvironmentHandle,
        descriptor: QueryDescriptor,
    ) -> Option<JoinHandle<bool>> {
        let restarted = self.shared.state.send_if_modified(|snapshot| {
            if snapshot.generation == generation {
                return false;
            }
            *snapshot = ExecutionSnapshot {
                generation,
                environment: Some(environment.id()),
                outcome: Outcome::Loading,
            };
            true
        });
        if !restarted {
            trace!(generation, "Generation unchanged, not restarting");
            return None;
        }

        self.shared.stats.started.fetch_add(1, Ordering::Relaxed);
        debug!(
            generation,
            environment = %environment.id(),
            operation = %descriptor.name,
            "Starting execution"
        );

        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        Some(runtime.spawn(async move {
            let result = engine.execute(&environment, &descriptor).await;
            shared.complete(generation, result)
        }))
    }

    /// Stop accepting results from every outstanding execution
    pub fn retire(&self) {
        self.shared.state.send_modify(|snapshot| {
            *snapshot = ExecutionSnapshot::default();
        });
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified whenever the executor restarts or applies a result
    pub fn subscribe(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.shared.state.borrow().generation
    }

    pub fn stats(&self) -> ExecutorStatsSnapshot {
        ExecutorStatsSnapshot {
            started: self.shared.stats.started.load(Ordering::Relaxed),
            applied: self.shared.stats.applied.load(Ordering::Relaxed),
            discarded: self.shared.stats.discarded.load(Ordering::Relaxed),
        }
    }

    pub fn spec(&self) -> &RenderSpec<V> {
        &self.spec
    }

    /// Render the current outcome. Renders nothing while idle.
    pub fn render(&self) -> Option<V> {
        // Clone first: views may call retry, which writes to the channel
        let snapshot = self.snapshot();
        if snapshot.generation == IDLE_GENERATION {
            return None;
        }
        self.spec.select(&snapshot.outcome, &self.retry)
    }
}
