use std::sync::Arc;

use crate::api::Registry;
use crate::cache::{MemoryCache, MountTable, StoreDescriptor};
use crate::session::Session;
use crate::store::memory::MemRepository;

pub struct TestEnv {
    pub registry: Registry,
    pub backend: Arc<MemRepository>,
    pub cache: Arc<MemoryCache>,
    pub session: Session,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_mounts(MountTable::new(Self::local_store()))
    }

    pub fn with_mounts(mounts: MountTable) -> Self {
        let backend = Arc::new(MemRepository::new());
        let cache = Arc::new(MemoryCache::new());
        let registry = Registry::new(backend.clone(), cache.clone(), mounts)
            .expect("failed to build registry");
        Self {
            registry,
            backend,
            cache,
            session: Session::default(),
        }
    }

    pub fn local_store() -> StoreDescriptor {
        StoreDescriptor::new("local", "mem://local", "registry@carbon.super")
    }
}
