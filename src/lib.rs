//! Relay Host: swappable data-fetch environments for query hosts
//!
//! An `EnvironmentFactory` owns the current environment and a registry of
//! mounted `QueryHost`s. Refreshing the factory swaps the environment and
//! broadcasts it; each host bumps its generation and restarts its
//! `QueryExecutor`, which discards results from earlier generations.

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod executor;
pub mod factory;
pub mod fetch;
pub mod host;
pub mod logging;
pub mod operation;
pub mod registry;
pub mod render;

pub use engine::{NetworkQueryEngine, QueryEngine};
pub use environment::{EnvironmentHandle, EnvironmentId, EnvironmentProvider};
pub use executor::{ExecutionSnapshot, QueryExecutor};
pub use factory::{EnvironmentAccess, EnvironmentFactory};
pub use host::QueryHost;
pub use operation::{OperationKind, QueryDescriptor, Variables};
pub use registry::{SubscriberId, SubscriberRegistry};
pub use render::{Outcome, Props, RenderSpec, RetryHandle};
