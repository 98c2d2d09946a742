//! Path → id allocation.
//!
//! Physical stores address rows by a numeric path id. Ids are looked up in
//! the shared cache first, then fetched, then allocated. Two threads may race
//! to allocate the same path: the store rejects the loser with a
//! [`RegistryError::Concurrency`], and the loser re-fetches the winner's id.
//! Stores that cannot hand back generated ids run insert-then-fetch under
//! one lock instead.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheKey, CacheStore, CacheValue};
use crate::error::{ErrorKind, RegistryError, Result};
use crate::session::Session;

pub trait PathIdStore: Send + Sync {
    fn fetch_path_id(&self, session: &Session, path: &str) -> Result<Option<i64>>;

    /// Allocates an id for `path`. Fails with a concurrency error when the
    /// path already has one. Returns the new id if the store generates it.
    fn insert_path(&self, session: &Session, path: &str) -> Result<Option<i64>>;

    fn returns_generated_ids(&self) -> bool {
        true
    }
}

pub struct PathIdCache {
    cache: Arc<dyn CacheStore>,
    insert_lock: Mutex<()>,
}

impl PathIdCache {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            insert_lock: Mutex::new(()),
        }
    }

    pub fn get_or_create(
        &self,
        session: &Session,
        connection_id: &str,
        path: &str,
        store: &dyn PathIdStore,
    ) -> Result<i64> {
        let key = CacheKey::new(connection_id, session.tenant(), path);
        match self.cache.get(&key) {
            Ok(Some(CacheValue::PathId(id))) => return Ok(id),
            Ok(_) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "path id cache read failed"),
        }

        let id = match store.fetch_path_id(session, path)? {
            Some(id) => id,
            None if store.returns_generated_ids() => self.insert_racing(session, path, store)?,
            None => self.insert_serialized(session, path, store)?,
        };

        if let Err(e) = self.cache.put(key.clone(), CacheValue::PathId(id)) {
            tracing::warn!(key = %key, error = %e, "path id cache write failed");
        }
        Ok(id)
    }

    fn insert_racing(&self, session: &Session, path: &str, store: &dyn PathIdStore) -> Result<i64> {
        match store.insert_path(session, path) {
            Ok(Some(id)) => Ok(id),
            Ok(None) => refetch(session, path, store),
            Err(e) if e.kind() == ErrorKind::Concurrency => {
                tracing::debug!(path, "lost path id race, reusing winner");
                refetch(session, path, store)
            }
            Err(e) => Err(e),
        }
    }

    fn insert_serialized(&self, session: &Session, path: &str, store: &dyn PathIdStore) -> Result<i64> {
        let _guard = self.insert_lock.lock();
        if let Some(id) = store.fetch_path_id(session, path)? {
            return Ok(id);
        }
        store.insert_path(session, path)?;
        refetch(session, path, store)
    }
}

fn refetch(session: &Session, path: &str, store: &dyn PathIdStore) -> Result<i64> {
    store
        .fetch_path_id(session, path)?
        .ok_or_else(|| RegistryError::Storage(format!("no path id allocated for {}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::memory::MemRepository;

    #[test]
    fn test_id_is_cached_after_first_lookup() {
        let cache = Arc::new(MemoryCache::new());
        let ids = PathIdCache::new(cache.clone());
        let store = MemRepository::new();
        let session = Session::default();
        let first = ids.get_or_create(&session, "u@db", "/a", &store).unwrap();
        assert_eq!(cache.len(), 1);
        let again = ids.get_or_create(&session, "u@db", "/a", &store).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_losing_inserter_reuses_winner_id() {
        let store = MemRepository::new();
        let winner = store.insert_path(&Session::default(), "/a").unwrap().unwrap();
        // The cache has never seen /a, and the store already has it.
        let ids = PathIdCache::new(Arc::new(MemoryCache::new()));
        let id = ids
            .insert_racing(&Session::default(), "/a", &store)
            .unwrap();
        assert_eq!(id, winner);
    }

    #[test]
    fn test_concurrent_allocation_has_one_winner() {
        for generated in [true, false] {
            let store = if generated {
                MemRepository::new()
            } else {
                MemRepository::without_generated_ids()
            };
            let ids = PathIdCache::new(Arc::new(MemoryCache::new()));
            let results: Vec<i64> = std::thread::scope(|s| {
                let (ids, store) = (&ids, &store);
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        s.spawn(move || {
                            let session = Session::default();
                            ids.get_or_create(&session, "u@db", "/shared/path", store)
                                .unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(results.windows(2).all(|w| w[0] == w[1]), "{:?}", results);
            assert_eq!(store.allocated_path_ids(&Session::default()), 1);
        }
    }
}
