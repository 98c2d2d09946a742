//! # Lookup Cache
//!
//! A shared key-value cache sits in front of the backing stores. Entries are
//! keyed by [`CacheKey`]: the physical store's connection identity, the
//! tenant and the path as that store sees it. Two aliases of the same
//! physical node therefore share one slot, while identical paths in two
//! stores never collide.
//!
//! The cache is never the source of truth. Invalidation is best-effort
//! ([`invalidator`]) and a miss always falls through to the store.
//!
//! - [`mounts`]: mount table and store descriptors.
//! - [`invalidator`]: eviction of stale entries after writes.
//! - [`path_ids`]: path → id allocation cache backing physical storage.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::error::Result;
use crate::model::Resource;
use crate::session::TenantId;

pub mod invalidator;
pub mod mounts;
pub mod path_ids;

pub use invalidator::{CacheInvalidator, RedirectTable};
pub use mounts::{Mount, MountTable, StoreDescriptor};
pub use path_ids::{PathIdCache, PathIdStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub connection_id: String,
    pub tenant: TenantId,
    pub path: String,
}

impl CacheKey {
    pub fn new(connection_id: impl Into<String>, tenant: TenantId, path: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            tenant,
            path: path.into(),
        }
    }

    /// True when both keys live in the same store and tenant namespace.
    pub fn same_namespace(&self, other: &CacheKey) -> bool {
        self.connection_id == other.connection_id && self.tenant == other.tenant
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:{}", self.connection_id, self.tenant, self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Resource(Box<Resource>),
    PathId(i64),
}

/// Key-value store shared by every request.
///
/// `keys` returns a snapshot: every key live when the call started is in it.
/// Keys inserted concurrently may or may not appear.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>>;
    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()>;
    fn contains_key(&self, key: &CacheKey) -> Result<bool>;
    /// Returns true if an entry was removed.
    fn remove(&self, key: &CacheKey) -> Result<bool>;
    fn keys(&self) -> Result<Vec<CacheKey>>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheValue>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn contains_key(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
