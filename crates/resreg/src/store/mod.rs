//! # Storage Layer
//!
//! The durable store is an external collaborator. This module defines the
//! [`Repository`] contract the pipeline falls back to once no handler has
//! completed an operation, plus two implementations:
//!
//! - [`memory::MemRepository`]: tenant-partitioned in-memory store, used for
//!   tests and embedding.
//! - [`cached::CachedRepository`]: wraps any repository with the shared
//!   lookup cache. Reads are served from the cache, writes delegate and then
//!   invalidate.
//!
//! ## Contract
//!
//! - Every method receives the caller's [`Session`]; stores partition data
//!   by `session.tenant()`.
//! - `get` returns `Ok(None)` for a missing path. `Err` is reserved for real
//!   failures (the pipeline reports lazy-lookup errors as server errors).
//! - Mutations on a missing path fail with [`crate::error::RegistryError::NotFound`].
//! - Versioned reads use `path;version:N` addresses.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Association, Comment, Rating, RatingValue, Resource};
use crate::path::PathAddress;
use crate::session::Session;

pub mod cached;
pub mod memory;

pub trait Repository: Send + Sync {
    fn get(&self, session: &Session, path: &PathAddress) -> Result<Option<Resource>>;

    /// Writes `resource` at `path`, creating missing parent collections.
    /// Returns the path actually written.
    fn put(&self, session: &Session, path: &str, resource: Resource) -> Result<String>;

    /// Deletes `path` and everything beneath it.
    fn delete(&self, session: &Session, path: &str) -> Result<()>;

    fn resource_exists(&self, session: &Session, path: &PathAddress) -> Result<bool>;

    fn move_resource(&self, session: &Session, source: &str, target: &str) -> Result<String>;

    fn copy(&self, session: &Session, source: &str, target: &str) -> Result<String>;

    fn rename(&self, session: &Session, source: &str, new_name: &str) -> Result<String>;

    /// Snapshots the current state of `path`. Returns the new version number.
    fn create_version(&self, session: &Session, path: &str) -> Result<i64>;

    fn restore_version(&self, session: &Session, version_path: &PathAddress) -> Result<()>;

    /// Version paths of `path`, newest first.
    fn get_versions(&self, session: &Session, path: &str) -> Result<Vec<String>>;

    fn create_link(&self, session: &Session, path: &str, target: &str) -> Result<()>;

    fn remove_link(&self, session: &Session, path: &str) -> Result<()>;

    fn add_association(&self, session: &Session, association: &Association) -> Result<()>;

    fn remove_association(&self, session: &Session, association: &Association) -> Result<()>;

    /// Associations where `path` is the source or the target, optionally of one kind.
    fn get_associations(
        &self,
        session: &Session,
        path: &str,
        kind: Option<&str>,
    ) -> Result<Vec<Association>>;

    /// Stores a comment and returns its `path;comments:N` address.
    fn add_comment(&self, session: &Session, path: &str, comment: Comment) -> Result<String>;

    fn get_comment(&self, session: &Session, path: &str, id: u64) -> Result<Option<Comment>>;

    fn rate_resource(&self, session: &Session, path: &str, rating: Rating) -> Result<()>;

    fn get_rating(&self, session: &Session, path: &str, user: &str)
        -> Result<Option<RatingValue>>;

    fn apply_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()>;

    fn remove_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()>;

    fn get_tags(&self, session: &Session, path: &str) -> Result<Vec<String>>;

    /// Runs a stored query. Query semantics belong to the store.
    fn execute_query(
        &self,
        session: &Session,
        path: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;
}
