//! Subscriber registry: who wants to hear about a new environment.
//!
//! Ids are handed out from 1 upward and never reused for the lifetime of the
//! registry. Broadcast delivers to a snapshot taken when it starts, in
//! registration order, with the lock released so callbacks may register or
//! unregister freely.
//!
//! Only the owning factory registers, unregisters and broadcasts; outside the
//! crate the registry is read-only.

use crate::environment::EnvironmentHandle;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Receives each newly broadcast environment
pub(crate) type EnvironmentCallback = Arc<dyn Fn(EnvironmentHandle) + Send + Sync>;

struct RegistryState {
    next_id: u64,
    // Ids are monotonic, so key order is registration order
    entries: BTreeMap<SubscriberId, EnvironmentCallback>,
    epoch: u64,
}

/// Registrations captured when a broadcast starts
pub(crate) struct PendingBroadcast {
    epoch: u64,
    entries: Vec<(SubscriberId, EnvironmentCallback)>,
}

impl PendingBroadcast {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                entries: BTreeMap::new(),
                epoch: 0,
            }),
        }
    }

    /// Store a callback under the next id
    pub(crate) fn register(&self, callback: EnvironmentCallback) -> SubscriberId {
        let mut state = self.state.lock();
        let id = SubscriberId(state.next_id);
        state.next_id += 1;
        state.entries.insert(id, callback);
        debug!(subscriber = %id, registered = state.entries.len(), "Registered subscriber");
        id
    }

    /// Remove a registration. Unknown ids are ignored; returns whether an entry
    /// was removed.
    pub(crate) fn unregister(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, registered = state.entries.len(), "Unregistered subscriber");
        } else {
            trace!(subscriber = %id, "Unregister of unknown subscriber ignored");
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.state.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.state.lock().entries.keys().copied().collect()
    }

    /// Deliver `handle` to every registration present when the broadcast
    /// starts. Returns the number of callbacks invoked.
    pub(crate) fn broadcast(&self, handle: &EnvironmentHandle) -> usize {
        let pending = self.begin_broadcast();
        self.deliver(pending, handle)
    }

    /// Snapshot the registrations and supersede any broadcast still being
    /// delivered.
    pub(crate) fn begin_broadcast(&self) -> PendingBroadcast {
        let mut state = self.state.lock();
        state.epoch += 1;
        PendingBroadcast {
            epoch: state.epoch,
            entries: state
                .entries
                .iter()
                .map(|(id, callback)| (*id, Arc::clone(callback)))
                .collect(),
        }
    }

    /// Invoke a snapshot's callbacks in registration order.
    ///
    /// Entries unregistered while delivery is underway are skipped, and entries
    /// registered meanwhile wait for the next broadcast. If a callback starts a
    /// newer broadcast, the rest of this one is abandoned: the newer snapshot
    /// already covers every remaining subscriber.
    pub(crate) fn deliver(&self, pending: PendingBroadcast, handle: &EnvironmentHandle) -> usize {
        let mut delivered = 0;
        for (id, callback) in pending.entries {
            {
                let state = self.state.lock();
                if state.epoch != pending.epoch {
                    debug!(
                        environment = %handle.id(),
                        delivered,
                        "Broadcast superseded by a newer one"
                    );
                    return delivered;
                }
                if !state.entries.contains_key(&id) {
                    trace!(subscriber = %id, "Skipping subscriber removed during broadcast");
                    continue;
                }
            }
            callback(handle.clone());
            delivered += 1;
        }
        debug!(environment = %handle.id(), delivered, "Broadcast environment");
        delivered
    }
}
