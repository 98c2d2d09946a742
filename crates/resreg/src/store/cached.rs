use std::collections::BTreeMap;
use std::sync::Arc;

use super::Repository;
use crate::cache::{CacheInvalidator, CacheValue, Mount};
use crate::error::Result;
use crate::model::{Association, Comment, Rating, RatingValue, Resource};
use crate::path::{self, PathAddress};
use crate::session::Session;

/// Read-through cache in front of another repository.
///
/// Paths under a logical mount are routed to their physical target before
/// they reach the inner repository, so an alias and its target are one
/// node. Results come back under the name the caller used.
///
/// `get` is answered from the shared cache when possible and populates it
/// on a miss. Links are never cached: their content belongs to the target.
/// Every write is delegated first and then invalidates the affected
/// entries. Cache failures are logged and otherwise ignored.
pub struct CachedRepository {
    inner: Arc<dyn Repository>,
    invalidator: Arc<CacheInvalidator>,
}

/// A path as the inner repository sees it, plus the mount it came through.
struct Routed<'a> {
    path: String,
    mount: Option<&'a Mount>,
}

impl Routed<'_> {
    fn restore(&self, physical: String) -> String {
        self.mount
            .and_then(|m| m.alias_of(&physical))
            .unwrap_or(physical)
    }

    fn restore_all(&self, paths: Vec<String>) -> Vec<String> {
        paths.into_iter().map(|p| self.restore(p)).collect()
    }

    fn restore_resource(&self, mut resource: Resource) -> Resource {
        resource.path = self.restore(std::mem::take(&mut resource.path));
        resource.children = self.restore_all(std::mem::take(&mut resource.children));
        resource
    }

    fn restore_association(&self, association: Association) -> Association {
        Association {
            source: self.restore(association.source),
            target: self.restore(association.target),
            kind: association.kind,
        }
    }
}

impl CachedRepository {
    pub fn new(inner: Arc<dyn Repository>, invalidator: Arc<CacheInvalidator>) -> Self {
        Self { inner, invalidator }
    }

    pub fn inner(&self) -> &Arc<dyn Repository> {
        &self.inner
    }

    pub fn invalidator(&self) -> &Arc<CacheInvalidator> {
        &self.invalidator
    }

    fn route(&self, path: &str) -> Routed<'_> {
        match self.invalidator.mounts().route(path) {
            Some((mount, routed)) => {
                tracing::trace!(from = path, to = %routed, "routed through mount");
                Routed {
                    path: routed,
                    mount: Some(mount),
                }
            }
            None => Routed {
                path: path.to_string(),
                mount: None,
            },
        }
    }

    fn route_address(&self, address: &PathAddress) -> (PathAddress, Routed<'_>) {
        let routed = self.route(&address.to_string());
        (PathAddress::parse(&routed.path), routed)
    }

    fn evict(&self, session: &Session, paths: &[&str], recursive: bool) {
        let mounts = self.invalidator.mounts();
        for path in paths {
            self.invalidator.invalidate(session, path, recursive);
            // The listing that holds a mounted subtree lives outside its namespace.
            let holder = mounts
                .store_for_target(path)
                .and_then(|(target, _)| path::parent(target));
            if let Some(holder) = holder {
                self.invalidator.invalidate(session, &holder, false);
            }
        }
    }
}

impl Repository for CachedRepository {
    fn get(&self, session: &Session, path: &PathAddress) -> Result<Option<Resource>> {
        let (address, routed) = self.route_address(path);
        let key = self.invalidator.key_for(session, &address);
        let cache = self.invalidator.cache();
        match cache.get(&key) {
            Ok(Some(CacheValue::Resource(resource))) => {
                tracing::trace!(key = %key, "cache hit");
                return Ok(Some(routed.restore_resource(*resource)));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "cache read failed"),
        }

        let resource = self.inner.get(session, &address)?;
        if let Some(r) = resource.as_ref().filter(|r| !r.is_link()) {
            if let Err(e) = cache.put(key.clone(), CacheValue::Resource(Box::new(r.clone()))) {
                tracing::warn!(key = %key, error = %e, "cache write failed");
            }
        }
        Ok(resource.map(|r| routed.restore_resource(r)))
    }

    fn put(&self, session: &Session, path: &str, resource: Resource) -> Result<String> {
        let routed = self.route(path);
        let written = self.inner.put(session, &routed.path, resource)?;
        self.evict(session, &[&written], false);
        Ok(routed.restore(written))
    }

    fn delete(&self, session: &Session, path: &str) -> Result<()> {
        let routed = self.route(path);
        self.inner.delete(session, &routed.path)?;
        self.evict(session, &[&routed.path], true);
        Ok(())
    }

    fn resource_exists(&self, session: &Session, path: &PathAddress) -> Result<bool> {
        let (address, _) = self.route_address(path);
        self.inner.resource_exists(session, &address)
    }

    fn move_resource(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        let (source, target) = (self.route(source), self.route(target));
        let moved = self.inner.move_resource(session, &source.path, &target.path)?;
        self.evict(session, &[&source.path, &moved], true);
        Ok(target.restore(moved))
    }

    fn copy(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        let (source, target) = (self.route(source), self.route(target));
        let copied = self.inner.copy(session, &source.path, &target.path)?;
        self.evict(session, &[&copied], true);
        Ok(target.restore(copied))
    }

    fn rename(&self, session: &Session, source: &str, new_name: &str) -> Result<String> {
        let source = self.route(source);
        let renamed = self.inner.rename(session, &source.path, new_name)?;
        self.evict(session, &[&source.path, &renamed], true);
        Ok(source.restore(renamed))
    }

    fn create_version(&self, session: &Session, path: &str) -> Result<i64> {
        let routed = self.route(path);
        let version = self.inner.create_version(session, &routed.path)?;
        self.evict(session, &[&routed.path], false);
        Ok(version)
    }

    fn restore_version(&self, session: &Session, version_path: &PathAddress) -> Result<()> {
        let (address, _) = self.route_address(version_path);
        self.inner.restore_version(session, &address)?;
        self.evict(session, &[address.path()], true);
        Ok(())
    }

    fn get_versions(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        let routed = self.route(path);
        let versions = self.inner.get_versions(session, &routed.path)?;
        Ok(routed.restore_all(versions))
    }

    fn create_link(&self, session: &Session, path: &str, target: &str) -> Result<()> {
        let routed = self.route(path);
        let target = self.route(target);
        self.inner.create_link(session, &routed.path, &target.path)?;
        self.evict(session, &[&routed.path], true);
        Ok(())
    }

    fn remove_link(&self, session: &Session, path: &str) -> Result<()> {
        let routed = self.route(path);
        self.inner.remove_link(session, &routed.path)?;
        self.evict(session, &[&routed.path], true);
        Ok(())
    }

    fn add_association(&self, session: &Session, association: &Association) -> Result<()> {
        let routed = Association::new(
            self.route(&association.source).path,
            self.route(&association.target).path,
            association.kind.clone(),
        );
        self.inner.add_association(session, &routed)?;
        self.evict(session, &[&routed.source], false);
        Ok(())
    }

    fn remove_association(&self, session: &Session, association: &Association) -> Result<()> {
        let routed = Association::new(
            self.route(&association.source).path,
            self.route(&association.target).path,
            association.kind.clone(),
        );
        self.inner.remove_association(session, &routed)?;
        self.evict(session, &[&routed.source], false);
        Ok(())
    }

    fn get_associations(
        &self,
        session: &Session,
        path: &str,
        kind: Option<&str>,
    ) -> Result<Vec<Association>> {
        let routed = self.route(path);
        let associations = self.inner.get_associations(session, &routed.path, kind)?;
        Ok(associations
            .into_iter()
            .map(|a| routed.restore_association(a))
            .collect())
    }

    fn add_comment(&self, session: &Session, path: &str, comment: Comment) -> Result<String> {
        let routed = self.route(path);
        let address = self.inner.add_comment(session, &routed.path, comment)?;
        self.evict(session, &[&routed.path], false);
        Ok(routed.restore(address))
    }

    fn get_comment(&self, session: &Session, path: &str, id: u64) -> Result<Option<Comment>> {
        self.inner.get_comment(session, &self.route(path).path, id)
    }

    fn rate_resource(&self, session: &Session, path: &str, rating: Rating) -> Result<()> {
        let routed = self.route(path);
        self.inner.rate_resource(session, &routed.path, rating)?;
        self.evict(session, &[&routed.path], false);
        Ok(())
    }

    fn get_rating(
        &self,
        session: &Session,
        path: &str,
        user: &str,
    ) -> Result<Option<RatingValue>> {
        self.inner.get_rating(session, &self.route(path).path, user)
    }

    fn apply_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        let routed = self.route(path);
        self.inner.apply_tag(session, &routed.path, tag)?;
        self.evict(session, &[&routed.path], false);
        Ok(())
    }

    fn remove_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        let routed = self.route(path);
        self.inner.remove_tag(session, &routed.path, tag)?;
        self.evict(session, &[&routed.path], false);
        Ok(())
    }

    fn get_tags(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        self.inner.get_tags(session, &self.route(path).path)
    }

    fn execute_query(
        &self,
        session: &Session,
        path: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let routed = self.route(path);
        let results = self.inner.execute_query(session, &routed.path, parameters)?;
        Ok(routed.restore_all(results))
    }
}
