//! # Handler Pipeline
//!
//! Every registry operation is routed through an ordered chain of
//! registrations, each a `(methods, filter, handler)` triple:
//!
//! - [`Operation`]: the operation kinds, and [`OperationSet`] for the
//!   methods a registration applies to.
//! - [`filter`]: predicates deciding whether a handler applies to a call.
//! - [`handler`]: the [`Handler`] trait, one no-op-by-default method per
//!   operation kind.
//! - [`manager`]: [`HandlerPipeline`], the ordered registry and its dispatch
//!   loop.
//! - [`tenant`]: [`TenantPipelines`], the base pipeline plus one user
//!   pipeline per tenant.
//! - [`builtin`]: the handlers every registry installs (simulation, cache
//!   invalidation, comment and rating URLs).
//!
//! Handlers are shared between all concurrent requests. Per-call state
//! lives in the [`crate::context::RequestContext`], never in the handler.

use std::fmt;

pub mod builtin;
pub mod filter;
pub mod handler;
pub mod manager;
pub mod tenant;

pub use filter::{Filter, FilterExt, MatchAll, MediaTypeMatcher, SimulationFilter, UrlMatcher};
pub use handler::{Handler, HandlerOutput};
pub use manager::{HandlerPipeline, HandlerRegistration, LifecyclePhase, Priority};
pub use tenant::TenantPipelines;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Get,
    Put,
    Delete,
    ResourceExists,
    Move,
    Copy,
    Rename,
    CreateVersion,
    RestoreVersion,
    GetVersions,
    CreateLink,
    RemoveLink,
    AddAssociation,
    RemoveAssociation,
    GetAssociations,
    AddComment,
    RateResource,
    ApplyTag,
    RemoveTag,
    ExecuteQuery,
    Dump,
    Restore,
}

impl Operation {
    pub const ALL: [Operation; 22] = [
        Operation::Get,
        Operation::Put,
        Operation::Delete,
        Operation::ResourceExists,
        Operation::Move,
        Operation::Copy,
        Operation::Rename,
        Operation::CreateVersion,
        Operation::RestoreVersion,
        Operation::GetVersions,
        Operation::CreateLink,
        Operation::RemoveLink,
        Operation::AddAssociation,
        Operation::RemoveAssociation,
        Operation::GetAssociations,
        Operation::AddComment,
        Operation::RateResource,
        Operation::ApplyTag,
        Operation::RemoveTag,
        Operation::ExecuteQuery,
        Operation::Dump,
        Operation::Restore,
    ];

    /// True for operations that change stored state.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            Operation::Get
                | Operation::ResourceExists
                | Operation::GetVersions
                | Operation::GetAssociations
                | Operation::ExecuteQuery
                | Operation::Dump
        )
    }

    /// Operations whose subject is a source path with a separate target.
    pub fn has_source(self) -> bool {
        matches!(self, Operation::Move | Operation::Copy | Operation::Rename)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::ResourceExists => "resourceExists",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Rename => "rename",
            Operation::CreateVersion => "createVersion",
            Operation::RestoreVersion => "restoreVersion",
            Operation::GetVersions => "getVersions",
            Operation::CreateLink => "createLink",
            Operation::RemoveLink => "removeLink",
            Operation::AddAssociation => "addAssociation",
            Operation::RemoveAssociation => "removeAssociation",
            Operation::GetAssociations => "getAssociations",
            Operation::AddComment => "addComment",
            Operation::RateResource => "rateResource",
            Operation::ApplyTag => "applyTag",
            Operation::RemoveTag => "removeTag",
            Operation::ExecuteQuery => "executeQuery",
            Operation::Dump => "dump",
            Operation::Restore => "restore",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of operation kinds a registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationSet(u32);

impl OperationSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Operation::ALL.into_iter().collect()
    }

    pub fn of(operations: &[Operation]) -> Self {
        operations.iter().copied().collect()
    }

    /// Every operation that changes stored state.
    pub fn mutating() -> Self {
        Operation::ALL
            .into_iter()
            .filter(|op| op.is_mutating())
            .collect()
    }

    pub fn contains(self, operation: Operation) -> bool {
        self.0 & operation.bit() != 0
    }

    pub fn insert(&mut self, operation: Operation) {
        self.0 |= operation.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut set = OperationSet::empty();
        for op in iter {
            set.insert(op);
        }
        set
    }
}

/// Stable identity of a registration, assigned by whoever registers it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_set_membership() {
        let set = OperationSet::of(&[Operation::Put, Operation::Delete]);
        assert!(set.contains(Operation::Put));
        assert!(!set.contains(Operation::Get));
        assert_eq!(set.iter().count(), 2);
        assert!(OperationSet::empty().is_empty());
    }

    #[test]
    fn test_all_covers_every_kind() {
        let all = OperationSet::all();
        assert!(Operation::ALL.iter().all(|op| all.contains(*op)));
    }

    #[test]
    fn test_mutating_classification() {
        assert!(!Operation::Get.is_mutating());
        assert!(!Operation::Dump.is_mutating());
        assert!(Operation::Restore.is_mutating());
        assert!(Operation::AddComment.is_mutating());
        let mutating = OperationSet::mutating();
        assert!(mutating.contains(Operation::Move));
        assert!(!mutating.contains(Operation::ExecuteQuery));
    }
}
