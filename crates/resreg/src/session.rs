//! # Sessions
//!
//! A [`Session`] carries the state that belongs to one calling thread: the
//! active tenant, the caller's user name, an optional backing-store override
//! and the simulation (dry-run) flag. It is passed by reference into every
//! registry call instead of being looked up from thread-local globals.
//!
//! A session is `!Sync`. Share the [`crate::api::Registry`] across threads
//! and give each thread its own session.

use std::cell::Cell;
use std::fmt;

use crate::cache::mounts::StoreDescriptor;

/// Logical tenant identifier. Cache keys and per-tenant pipelines are scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TenantId(pub i32);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dry-run switch for the current session.
///
/// Toggling returns a guard that restores the previous value when dropped,
/// so nested simulations unwind correctly.
#[derive(Debug, Default)]
pub struct SimulationController {
    active: Cell<bool>,
}

impl SimulationController {
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn set(&self, active: bool) -> SimulationGuard<'_> {
        let previous = self.active.replace(active);
        SimulationGuard {
            controller: self,
            previous,
        }
    }

    pub fn enter(&self) -> SimulationGuard<'_> {
        self.set(true)
    }
}

#[must_use = "simulation ends when the guard is dropped"]
pub struct SimulationGuard<'a> {
    controller: &'a SimulationController,
    previous: bool,
}

impl Drop for SimulationGuard<'_> {
    fn drop(&mut self) {
        self.controller.active.set(self.previous);
    }
}

#[derive(Debug, Default)]
pub struct Session {
    tenant: TenantId,
    user: Option<String>,
    store: Option<StoreDescriptor>,
    simulation: SimulationController,
    executions: Cell<u64>,
}

impl Session {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Overrides the backing store this session falls back to when a path
    /// is not owned by any mount.
    pub fn with_store(mut self, store: StoreDescriptor) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn store(&self) -> Option<&StoreDescriptor> {
        self.store.as_ref()
    }

    pub fn simulation(&self) -> &SimulationController {
        &self.simulation
    }

    pub fn is_simulating(&self) -> bool {
        self.simulation.is_active()
    }

    /// Monotonically increasing id stamped on every handler execution.
    pub(crate) fn next_execution_id(&self) -> u64 {
        let id = self.executions.get() + 1;
        self.executions.set(id);
        id
    }
}
