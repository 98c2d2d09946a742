//! # Cache Invalidation
//!
//! After a write, every cache entry that could now be stale has to go. For a
//! mutated path that means:
//!
//! 1. **Resolve** the owning store. Physical target paths are checked first,
//!    then logical mount paths (which rewrite the path onto the target).
//!    Otherwise the session's own store, then the default store.
//! 2. **Local pass.** When the owning store is not the caller's local store,
//!    the same node is also visible under the caller's namespace at its
//!    original path. A nested invalidation runs for it, guided by a
//!    [`RedirectTable`] frame mapping the rewritten path back to the
//!    original so the nested call resolves locally and does not recurse.
//! 3. **Exact entry.** The entry for the path itself, with any parameters
//!    (versions, comments, ratings, listings).
//! 4. **Descendants**, when recursive.
//! 5. **Ancestors.** Listing entries for the parent (plain, trailing `/`, or
//!    paged with `start`/`pageLen`) at every level up to and including the
//!    root.
//!
//! Invalidation is best-effort: cache failures are logged and never
//! propagate to the write that triggered them.

use std::sync::Arc;

use crate::cache::mounts::{MountTable, StoreDescriptor};
use crate::cache::{CacheKey, CacheStore};
use crate::path::{self, PathAddress, PAGE_LEN_PARAM, ROOT, SEPARATOR, START_PARAM};
use crate::session::Session;

/// Scoped map from rewritten paths back to the path the caller used.
///
/// Frames are pushed on entry to a local pass and popped on exit, so nested
/// invalidations see the redirects of every enclosing call.
#[derive(Debug, Default)]
pub struct RedirectTable {
    frames: Vec<(String, String)>,
}

impl RedirectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rewritten: impl Into<String>, original: impl Into<String>) {
        self.frames.push((rewritten.into(), original.into()));
    }

    pub fn pop(&mut self) -> Option<(String, String)> {
        self.frames.pop()
    }

    /// Innermost redirect for `path`.
    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find(|(rewritten, _)| rewritten == path)
            .map(|(_, original)| original.as_str())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Where an invalidation lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub store: StoreDescriptor,
    /// The path as the owning store sees it.
    pub cleanup_path: String,
    /// True when a local pass under the caller's own store is also needed.
    pub needs_local_pass: bool,
}

pub struct CacheInvalidator {
    cache: Arc<dyn CacheStore>,
    mounts: Arc<MountTable>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>, mounts: Arc<MountTable>) -> Self {
        Self { cache, mounts }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// The store a session falls back to for unmounted paths.
    pub fn local_store<'a>(&'a self, session: &'a Session) -> &'a StoreDescriptor {
        session
            .store()
            .unwrap_or_else(|| self.mounts.default_store())
    }

    pub fn resolve(&self, session: &Session, path: &str, redirects: &RedirectTable) -> ResolvedTarget {
        if let Some(original) = redirects.lookup(path) {
            return ResolvedTarget {
                store: self.local_store(session).clone(),
                cleanup_path: original.to_string(),
                needs_local_pass: false,
            };
        }

        let local = self.local_store(session);
        match self.mounts.resolve(path) {
            Some((store, cleanup_path, matched)) => {
                let needs_local_pass = store != *local;
                tracing::trace!(path, %store, %cleanup_path, ?matched, "mount resolved");
                ResolvedTarget {
                    store,
                    cleanup_path,
                    needs_local_pass,
                }
            }
            None => ResolvedTarget {
                store: local.clone(),
                cleanup_path: path.to_string(),
                needs_local_pass: false,
            },
        }
    }

    /// Cache key under which a read of `address` is stored.
    pub fn key_for(&self, session: &Session, address: &PathAddress) -> CacheKey {
        let target = self.resolve(session, address.path(), &RedirectTable::new());
        let mut physical = PathAddress::new(&target.cleanup_path);
        for (name, value) in address.parameters() {
            physical.set_parameter(name, value.as_deref());
        }
        CacheKey::new(
            target.store.connection_id(),
            session.tenant(),
            physical.to_string(),
        )
    }

    /// Evicts every entry made stale by a write to `path`. Returns how many were removed.
    pub fn invalidate(&self, session: &Session, path: &str, recursive: bool) -> usize {
        let mut redirects = RedirectTable::new();
        self.invalidate_with(session, path, recursive, &mut redirects)
    }

    pub fn invalidate_with(
        &self,
        session: &Session,
        path: &str,
        recursive: bool,
        redirects: &mut RedirectTable,
    ) -> usize {
        let base = PathAddress::parse(path);
        let target = self.resolve(session, base.path(), redirects);
        tracing::debug!(
            path = base.path(),
            store = %target.store,
            cleanup_path = %target.cleanup_path,
            recursive,
            depth = redirects.depth(),
            "invalidating cache"
        );

        let mut removed = 0;
        if target.needs_local_pass {
            redirects.push(target.cleanup_path.clone(), base.path());
            removed += self.invalidate_with(session, &target.cleanup_path, recursive, redirects);
            redirects.pop();
        }

        let key = CacheKey::new(
            target.store.connection_id(),
            session.tenant(),
            target.cleanup_path.clone(),
        );
        removed += self.remove_key(&key);

        let namespace = match self.cache.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.same_namespace(&key))
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache scan failed");
                return removed;
            }
        };

        removed += self.remove_descendants(&namespace, &target.cleanup_path, recursive);
        removed += self.climb_ancestors(&namespace, &target.cleanup_path);
        removed
    }

    fn remove_key(&self, key: &CacheKey) -> usize {
        match self.cache.remove(key) {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache eviction failed");
                0
            }
        }
    }

    /// Parameterized entries of `cleanup_path`, plus everything beneath it when recursive.
    fn remove_descendants(&self, namespace: &[CacheKey], cleanup_path: &str, recursive: bool) -> usize {
        namespace
            .iter()
            .filter(|k| {
                let base = PathAddress::parse(&k.path);
                let base = trim_separator(base.path());
                base == trim_separator(cleanup_path)
                    || (recursive && path::is_within(base, cleanup_path))
            })
            .map(|k| self.remove_key(k))
            .sum()
    }

    /// Clears listings of every ancestor up to the root.
    ///
    /// Writes may create intermediate collections, so an uncached level
    /// says nothing about the levels above it.
    fn climb_ancestors(&self, namespace: &[CacheKey], cleanup_path: &str) -> usize {
        let mut removed = 0;
        let mut current = path::parent(cleanup_path);
        while let Some(ancestor) = current {
            removed += namespace
                .iter()
                .filter(|k| is_listing_of(&k.path, &ancestor))
                .map(|k| self.remove_key(k))
                .sum::<usize>();
            if ancestor == ROOT {
                break;
            }
            current = path::parent(&ancestor);
        }
        removed
    }
}

fn trim_separator(p: &str) -> &str {
    if p == ROOT {
        p
    } else {
        p.strip_suffix(SEPARATOR).unwrap_or(p)
    }
}

/// True for `parent`, `parent/` and paged listings `parent;start:N;pageLen:M`.
fn is_listing_of(cached_path: &str, parent: &str) -> bool {
    let address = PathAddress::parse(cached_path);
    trim_separator(address.path()) == trim_separator(parent)
        && address
            .parameters()
            .keys()
            .all(|name| name == START_PARAM || name == PAGE_LEN_PARAM)
}
