use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::Repository;
use crate::cache::path_ids::PathIdStore;
use crate::error::{RegistryError, Result};
use crate::model::{Association, Comment, Rating, RatingValue, Resource};
use crate::path::{self, PathAddress, PAGE_LEN_PARAM, ROOT, SEPARATOR, START_PARAM};
use crate::session::{Session, TenantId};

/// Query parameter matched against the resource media type instead of a property.
pub const MEDIA_TYPE_QUERY_PARAM: &str = "mediaType";

#[derive(Debug, Clone, Default)]
struct TenantData {
    resources: BTreeMap<String, Resource>,
    versions: BTreeMap<String, Vec<Resource>>,
    associations: BTreeSet<Association>,
    comments: BTreeMap<String, Vec<Comment>>,
    next_comment_id: u64,
    ratings: BTreeMap<String, BTreeMap<String, RatingValue>>,
    tags: BTreeMap<String, BTreeSet<String>>,
    path_ids: BTreeMap<String, i64>,
}

impl TenantData {
    fn exists(&self, path: &str) -> bool {
        path == ROOT || self.resources.contains_key(path)
    }

    fn require(&self, path: &str) -> Result<()> {
        if self.exists(path) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(path.to_string()))
        }
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.resources
            .keys()
            .filter(|k| path::parent(k).as_deref() == Some(path))
            .cloned()
            .collect()
    }

    fn subtree(&self, path: &str) -> Vec<String> {
        self.resources
            .keys()
            .filter(|k| path::is_within(k, path))
            .cloned()
            .collect()
    }

    /// Resource at `path` with collection children filled in. The root always exists.
    fn materialize(&self, path: &str) -> Option<Resource> {
        let mut resource = match self.resources.get(path) {
            Some(r) => r.clone(),
            None if path == ROOT => {
                let mut root = Resource::collection();
                root.path = ROOT.to_string();
                root
            }
            None => return None,
        };
        if resource.is_collection {
            resource.children = self.children(path);
        }
        Some(resource)
    }

    fn ensure_parents(&mut self, path: &str) -> Result<()> {
        let mut ancestors = Vec::new();
        let mut current = path::parent(path);
        while let Some(p) = current {
            if p == ROOT {
                break;
            }
            current = path::parent(&p);
            ancestors.push(p);
        }
        for ancestor in ancestors.into_iter().rev() {
            match self.resources.get(&ancestor) {
                Some(r) if !r.is_collection => {
                    return Err(RegistryError::InvalidPath(format!(
                        "{} is not a collection",
                        ancestor
                    )));
                }
                Some(_) => {}
                None => {
                    let mut collection = Resource::collection();
                    collection.path = ancestor.clone();
                    self.resources.insert(ancestor, collection);
                }
            }
        }
        Ok(())
    }

    fn remove_subtree(&mut self, path: &str) {
        for p in self.subtree(path) {
            self.resources.remove(&p);
            self.versions.remove(&p);
            self.comments.remove(&p);
            self.ratings.remove(&p);
            self.tags.remove(&p);
        }
        self.associations
            .retain(|a| !path::is_within(&a.source, path) && !path::is_within(&a.target, path));
    }

    /// Copies (or moves) the subtree at `source` to `target`.
    fn transplant(&mut self, source: &str, target: &str, keep_source: bool) -> Result<()> {
        self.require(source)?;
        if source == ROOT {
            return Err(RegistryError::InvalidPath("cannot relocate the root".into()));
        }
        if self.exists(target) {
            return Err(RegistryError::InvalidPath(format!("{} already exists", target)));
        }
        if path::is_within(target, source) {
            return Err(RegistryError::InvalidPath(format!(
                "cannot relocate {} beneath itself",
                source
            )));
        }
        self.ensure_parents(target)?;

        let now = Utc::now();
        for old in self.subtree(source) {
            let new = rebase(&old, source, target);
            let Some(mut resource) = self.resources.get(&old).cloned() else {
                continue;
            };
            resource.path = new.clone();
            resource.updated_at = now;
            if keep_source {
                resource.id = Uuid::new_v4();
                resource.created_at = now;
            }
            self.resources.insert(new.clone(), resource);
            if let Some(tags) = self.tags.get(&old).cloned() {
                self.tags.insert(new.clone(), tags);
            }
            if !keep_source {
                if let Some(v) = self.versions.remove(&old) {
                    self.versions.insert(new.clone(), v);
                }
                if let Some(c) = self.comments.remove(&old) {
                    self.comments.insert(new.clone(), c);
                }
                if let Some(r) = self.ratings.remove(&old) {
                    self.ratings.insert(new.clone(), r);
                }
                self.resources.remove(&old);
                self.tags.remove(&old);
            }
        }

        if !keep_source {
            self.associations = std::mem::take(&mut self.associations)
                .into_iter()
                .map(|a| Association {
                    source: relocate(&a.source, source, target),
                    target: relocate(&a.target, source, target),
                    kind: a.kind,
                })
                .collect();
        }
        Ok(())
    }
}

fn rebase(p: &str, from: &str, to: &str) -> String {
    format!("{}{}", to, &p[from.len()..])
}

fn relocate(p: &str, from: &str, to: &str) -> String {
    if path::is_within(p, from) {
        rebase(p, from, to)
    } else {
        p.to_string()
    }
}

fn clean(raw: &str) -> String {
    path::normalize(PathAddress::parse(raw).path())
}

/// In-memory repository for tests and embedding.
///
/// Data is partitioned by tenant. Paths are normalized on the way in, so
/// `/a/` and `/a` address the same node.
pub struct MemRepository {
    tenants: RwLock<HashMap<TenantId, TenantData>>,
    next_path_id: AtomicI64,
    generated_ids: bool,
    simulate_write_error: AtomicBool,
}

impl Default for MemRepository {
    fn default() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            next_path_id: AtomicI64::new(1),
            generated_ids: true,
            simulate_write_error: AtomicBool::new(false),
        }
    }
}

impl MemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that does not hand back generated path ids on insert.
    pub fn without_generated_ids() -> Self {
        Self {
            generated_ids: false,
            ..Self::default()
        }
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    pub fn allocated_path_ids(&self, session: &Session) -> usize {
        self.read(session, |data| data.path_ids.len())
    }

    pub fn resource_count(&self, session: &Session) -> usize {
        self.read(session, |data| data.resources.len())
    }

    fn read<T>(&self, session: &Session, f: impl FnOnce(&TenantData) -> T) -> T {
        let tenants = self.tenants.read();
        match tenants.get(&session.tenant()) {
            Some(data) => f(data),
            None => f(&TenantData::default()),
        }
    }

    fn write<T>(&self, session: &Session, f: impl FnOnce(&mut TenantData) -> Result<T>) -> Result<T> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(RegistryError::Storage("Simulated write error".to_string()));
        }
        let mut tenants = self.tenants.write();
        f(tenants.entry(session.tenant()).or_default())
    }
}

impl Repository for MemRepository {
    fn get(&self, session: &Session, address: &PathAddress) -> Result<Option<Resource>> {
        let base = path::normalize(address.path());
        self.read(session, |data| {
            if address.is_versioned() {
                let version = address.version() as usize;
                return Ok(data
                    .versions
                    .get(&base)
                    .and_then(|v| v.get(version))
                    .cloned()
                    .map(|mut r| {
                        r.path = format!("{};version:{}", base, version);
                        r
                    }));
            }

            let Some(mut resource) = data.materialize(&base) else {
                return Ok(None);
            };
            if let Some(target) = resource.link_target.clone() {
                if let Some(mut linked) = data.materialize(&clean(&target)) {
                    linked.path = base.clone();
                    linked.link_target = Some(target);
                    resource = linked;
                }
            }
            if resource.is_collection {
                resource.children = page(resource.children, address)?;
            }
            Ok(Some(resource))
        })
    }

    fn put(&self, session: &Session, path: &str, mut resource: Resource) -> Result<String> {
        let path = clean(path);
        self.write(session, |data| {
            if path == ROOT {
                return Err(RegistryError::InvalidPath("cannot overwrite the root".into()));
            }
            data.ensure_parents(&path)?;
            let now = Utc::now();
            if let Some(existing) = data.resources.get(&path) {
                resource.id = existing.id;
                resource.created_at = existing.created_at;
            }
            resource.path = path.clone();
            resource.children.clear();
            resource.updated_at = now;
            data.resources.insert(path.clone(), resource);
            Ok(path)
        })
    }

    fn delete(&self, session: &Session, path: &str) -> Result<()> {
        let path = clean(path);
        self.write(session, |data| {
            if path == ROOT {
                return Err(RegistryError::InvalidPath("cannot delete the root".into()));
            }
            data.require(&path)?;
            data.remove_subtree(&path);
            Ok(())
        })
    }

    fn resource_exists(&self, session: &Session, address: &PathAddress) -> Result<bool> {
        let base = path::normalize(address.path());
        Ok(self.read(session, |data| {
            if address.is_versioned() {
                data.versions
                    .get(&base)
                    .is_some_and(|v| (address.version() as usize) < v.len())
            } else {
                data.exists(&base)
            }
        }))
    }

    fn move_resource(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        let (source, target) = (clean(source), clean(target));
        self.write(session, |data| {
            data.transplant(&source, &target, false)?;
            Ok(target)
        })
    }

    fn copy(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        let (source, target) = (clean(source), clean(target));
        self.write(session, |data| {
            data.transplant(&source, &target, true)?;
            Ok(target)
        })
    }

    fn rename(&self, session: &Session, source: &str, new_name: &str) -> Result<String> {
        if new_name.is_empty() || new_name.contains(SEPARATOR) {
            return Err(RegistryError::InvalidParameter(format!(
                "invalid resource name '{}'",
                new_name
            )));
        }
        let source = clean(source);
        let parent = path::parent(&source)
            .ok_or_else(|| RegistryError::InvalidPath("cannot rename the root".into()))?;
        self.move_resource(session, &source, &path::join(&parent, new_name))
    }

    fn create_version(&self, session: &Session, path: &str) -> Result<i64> {
        let path = clean(path);
        self.write(session, |data| {
            let snapshot = data
                .materialize(&path)
                .ok_or_else(|| RegistryError::NotFound(path.clone()))?;
            let versions = data.versions.entry(path).or_default();
            versions.push(snapshot);
            Ok((versions.len() - 1) as i64)
        })
    }

    fn restore_version(&self, session: &Session, version_path: &PathAddress) -> Result<()> {
        if !version_path.is_versioned() {
            return Err(RegistryError::InvalidPath(format!(
                "{} does not name a version",
                version_path
            )));
        }
        let base = path::normalize(version_path.path());
        let version = version_path.version() as usize;
        self.write(session, |data| {
            let snapshot = data
                .versions
                .get(&base)
                .and_then(|v| v.get(version))
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(version_path.to_string()))?;
            data.ensure_parents(&base)?;
            let current = data.resources.entry(base.clone()).or_insert_with(|| {
                let mut r = snapshot.clone();
                r.path = base.clone();
                r
            });
            current.content = snapshot.content;
            current.media_type = snapshot.media_type;
            current.properties = snapshot.properties;
            current.link_target = snapshot.link_target;
            current.updated_at = Utc::now();
            Ok(())
        })
    }

    fn get_versions(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        let path = clean(path);
        self.read(session, |data| {
            data.require(&path)?;
            let count = data.versions.get(&path).map_or(0, Vec::len);
            Ok((0..count)
                .rev()
                .map(|v| format!("{};version:{}", path, v))
                .collect())
        })
    }

    fn create_link(&self, session: &Session, path: &str, target: &str) -> Result<()> {
        if !target.starts_with(SEPARATOR) {
            return Err(RegistryError::InvalidPath(format!(
                "link target must be absolute, got '{}'",
                target
            )));
        }
        let mut link = Resource::new(Vec::<u8>::new());
        link.link_target = Some(target.to_string());
        self.put(session, path, link).map(|_| ())
    }

    fn remove_link(&self, session: &Session, path: &str) -> Result<()> {
        let path = clean(path);
        self.write(session, |data| {
            match data.resources.get(&path) {
                Some(r) if r.is_link() => {}
                Some(_) => {
                    return Err(RegistryError::InvalidPath(format!("{} is not a link", path)));
                }
                None => return Err(RegistryError::NotFound(path)),
            }
            data.remove_subtree(&path);
            Ok(())
        })
    }

    fn add_association(&self, session: &Session, association: &Association) -> Result<()> {
        let association = Association::new(
            clean(&association.source),
            clean(&association.target),
            association.kind.clone(),
        );
        self.write(session, |data| {
            data.require(&association.source)?;
            data.associations.insert(association);
            Ok(())
        })
    }

    fn remove_association(&self, session: &Session, association: &Association) -> Result<()> {
        let association = Association::new(
            clean(&association.source),
            clean(&association.target),
            association.kind.clone(),
        );
        self.write(session, |data| {
            data.associations.remove(&association);
            Ok(())
        })
    }

    fn get_associations(
        &self,
        session: &Session,
        path: &str,
        kind: Option<&str>,
    ) -> Result<Vec<Association>> {
        let path = clean(path);
        Ok(self.read(session, |data| {
            data.associations
                .iter()
                .filter(|a| a.source == path || a.target == path)
                .filter(|a| kind.map_or(true, |k| a.kind == k))
                .cloned()
                .collect()
        }))
    }

    fn add_comment(&self, session: &Session, path: &str, mut comment: Comment) -> Result<String> {
        let path = clean(path);
        self.write(session, |data| {
            data.require(&path)?;
            data.next_comment_id += 1;
            comment.id = data.next_comment_id;
            let address = format!("{};comments:{}", path, comment.id);
            data.comments.entry(path).or_default().push(comment);
            Ok(address)
        })
    }

    fn get_comment(&self, session: &Session, path: &str, id: u64) -> Result<Option<Comment>> {
        let path = clean(path);
        Ok(self.read(session, |data| {
            data.comments
                .get(&path)
                .and_then(|c| c.iter().find(|c| c.id == id))
                .cloned()
        }))
    }

    fn rate_resource(&self, session: &Session, path: &str, rating: Rating) -> Result<()> {
        let path = clean(path);
        self.write(session, |data| {
            data.require(&path)?;
            data.ratings
                .entry(path)
                .or_default()
                .insert(rating.user, rating.value);
            Ok(())
        })
    }

    fn get_rating(
        &self,
        session: &Session,
        path: &str,
        user: &str,
    ) -> Result<Option<RatingValue>> {
        let path = clean(path);
        Ok(self.read(session, |data| {
            data.ratings.get(&path).and_then(|r| r.get(user)).copied()
        }))
    }

    fn apply_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(RegistryError::InvalidParameter("empty tag".into()));
        }
        let path = clean(path);
        self.write(session, |data| {
            data.require(&path)?;
            data.tags.entry(path).or_default().insert(tag.to_string());
            Ok(())
        })
    }

    fn remove_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        let path = clean(path);
        self.write(session, |data| {
            if let Some(tags) = data.tags.get_mut(&path) {
                tags.remove(tag.trim());
            }
            Ok(())
        })
    }

    fn get_tags(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        let path = clean(path);
        Ok(self.read(session, |data| {
            data.tags
                .get(&path)
                .map(|t| t.iter().cloned().collect())
                .unwrap_or_default()
        }))
    }

    /// Paths of non-collection resources under `path` whose properties equal
    /// every query parameter.
    fn execute_query(
        &self,
        session: &Session,
        path: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let scope = clean(path);
        Ok(self.read(session, |data| {
            data.resources
                .values()
                .filter(|r| !r.is_collection && path::is_within(&r.path, &scope))
                .filter(|r| {
                    parameters.iter().all(|(name, value)| {
                        if name == MEDIA_TYPE_QUERY_PARAM {
                            r.media_type.as_deref() == Some(value.as_str())
                        } else {
                            r.properties
                                .get(name)
                                .is_some_and(|values| values.iter().any(|v| v == value))
                        }
                    })
                })
                .map(|r| r.path.clone())
                .collect()
        }))
    }
}

/// Applies `;start:N;pageLen:M` to a child listing.
fn page(children: Vec<String>, address: &PathAddress) -> Result<Vec<String>> {
    let numeric = |name: &str| -> Result<Option<usize>> {
        address
            .parameter_value(name)
            .map(|v| {
                v.parse::<usize>().map_err(|_| {
                    RegistryError::InvalidParameter(format!("{} must be a number, got '{}'", name, v))
                })
            })
            .transpose()
    };
    let start = numeric(START_PARAM)?.unwrap_or(0);
    let len = numeric(PAGE_LEN_PARAM)?;
    let paged = children.into_iter().skip(start);
    Ok(match len {
        Some(n) => paged.take(n).collect(),
        None => paged.collect(),
    })
}

impl PathIdStore for MemRepository {
    fn fetch_path_id(&self, session: &Session, path: &str) -> Result<Option<i64>> {
        Ok(self.read(session, |data| data.path_ids.get(path).copied()))
    }

    fn insert_path(&self, session: &Session, path: &str) -> Result<Option<i64>> {
        let generated = self.generated_ids;
        let mut tenants = self.tenants.write();
        let data = tenants.entry(session.tenant()).or_default();
        if data.path_ids.contains_key(path) {
            return Err(RegistryError::Concurrency(format!(
                "path id for {} already allocated",
                path
            )));
        }
        let id = self.next_path_id.fetch_add(1, Ordering::SeqCst);
        data.path_ids.insert(path.to_string(), id);
        Ok(generated.then_some(id))
    }

    fn returns_generated_ids(&self) -> bool {
        self.generated_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Session, MemRepository) {
        (Session::default(), MemRepository::new())
    }

    fn get(repo: &MemRepository, session: &Session, p: &str) -> Option<Resource> {
        repo.get(session, &PathAddress::parse(p)).unwrap()
    }

    #[test]
    fn test_put_creates_parent_collections() {
        let (s, repo) = setup();
        repo.put(&s, "/a/b/c", Resource::new("x")).unwrap();
        let a = get(&repo, &s, "/a").unwrap();
        assert!(a.is_collection);
        assert_eq!(a.children, vec!["/a/b".to_string()]);
        let root = get(&repo, &s, "/").unwrap();
        assert_eq!(root.children, vec!["/a".to_string()]);
    }

    #[test]
    fn test_put_under_plain_resource_fails() {
        let (s, repo) = setup();
        repo.put(&s, "/a", Resource::new("x")).unwrap();
        let err = repo.put(&s, "/a/b", Resource::new("y")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPath(_)));
    }

    #[test]
    fn test_overwrite_keeps_identity() {
        let (s, repo) = setup();
        repo.put(&s, "/a", Resource::new("one")).unwrap();
        let first = get(&repo, &s, "/a").unwrap();
        repo.put(&s, "/a/", Resource::new("two")).unwrap();
        let second = get(&repo, &s, "/a").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content_str(), Some("two"));
    }

    #[test]
    fn test_delete_is_recursive() {
        let (s, repo) = setup();
        repo.put(&s, "/a/b/c", Resource::new("x")).unwrap();
        repo.put(&s, "/ab", Resource::new("y")).unwrap();
        repo.delete(&s, "/a").unwrap();
        assert!(get(&repo, &s, "/a/b/c").is_none());
        assert!(get(&repo, &s, "/ab").is_some());
        assert!(matches!(
            repo.delete(&s, "/a").unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[test]
    fn test_move_and_copy() {
        let (s, repo) = setup();
        repo.put(&s, "/src/f", Resource::new("x")).unwrap();
        repo.apply_tag(&s, "/src/f", "keep").unwrap();
        repo.copy(&s, "/src", "/dup").unwrap();
        assert!(get(&repo, &s, "/src/f").is_some());
        assert_ne!(
            get(&repo, &s, "/src/f").unwrap().id,
            get(&repo, &s, "/dup/f").unwrap().id
        );
        repo.move_resource(&s, "/src", "/dst/inner").unwrap();
        assert!(get(&repo, &s, "/src").is_none());
        assert_eq!(repo.get_tags(&s, "/dst/inner/f").unwrap(), vec!["keep"]);
        assert!(repo.move_resource(&s, "/dup", "/dup/x").is_err());
        assert!(repo.copy(&s, "/dup", "/dst").is_err());
    }

    #[test]
    fn test_rename() {
        let (s, repo) = setup();
        repo.put(&s, "/a/old", Resource::new("x")).unwrap();
        assert_eq!(repo.rename(&s, "/a/old", "new").unwrap(), "/a/new");
        assert!(repo.rename(&s, "/a/new", "x/y").is_err());
    }

    #[test]
    fn test_versions() {
        let (s, repo) = setup();
        repo.put(&s, "/doc", Resource::new("v0")).unwrap();
        assert_eq!(repo.create_version(&s, "/doc").unwrap(), 0);
        repo.put(&s, "/doc", Resource::new("v1")).unwrap();
        assert_eq!(repo.create_version(&s, "/doc").unwrap(), 1);
        repo.put(&s, "/doc", Resource::new("current")).unwrap();

        assert_eq!(
            repo.get_versions(&s, "/doc").unwrap(),
            vec!["/doc;version:1", "/doc;version:0"]
        );
        let old = get(&repo, &s, "/doc;version:0").unwrap();
        assert_eq!(old.content_str(), Some("v0"));
        assert_eq!(old.path, "/doc;version:0");

        repo.restore_version(&s, &PathAddress::parse("/doc;version:0"))
            .unwrap();
        assert_eq!(get(&repo, &s, "/doc").unwrap().content_str(), Some("v0"));
        assert!(repo
            .restore_version(&s, &PathAddress::parse("/doc;version:9"))
            .is_err());
    }

    #[test]
    fn test_links_resolve_one_level() {
        let (s, repo) = setup();
        repo.put(&s, "/real", Resource::new("payload")).unwrap();
        repo.create_link(&s, "/alias", "/real").unwrap();
        let via = get(&repo, &s, "/alias").unwrap();
        assert_eq!(via.content_str(), Some("payload"));
        assert_eq!(via.path, "/alias");
        assert!(repo.remove_link(&s, "/real").is_err());
        repo.remove_link(&s, "/alias").unwrap();
        assert!(get(&repo, &s, "/alias").is_none());
    }

    #[test]
    fn test_metadata() {
        let (s, repo) = setup();
        repo.put(&s, "/r", Resource::new("x")).unwrap();
        let addr = repo.add_comment(&s, "/r", Comment::new("nice")).unwrap();
        assert_eq!(addr, "/r;comments:1");
        assert_eq!(repo.get_comment(&s, "/r", 1).unwrap().unwrap().text, "nice");

        let value = RatingValue::new(4).unwrap();
        repo.rate_resource(
            &s,
            "/r",
            Rating {
                user: "alice".into(),
                value,
            },
        )
        .unwrap();
        assert_eq!(repo.get_rating(&s, "/r", "alice").unwrap(), Some(value));

        repo.add_association(&s, &Association::new("/r", "/other", "depends"))
            .unwrap();
        assert_eq!(repo.get_associations(&s, "/other", None).unwrap().len(), 1);
        assert!(repo
            .get_associations(&s, "/r", Some("owns"))
            .unwrap()
            .is_empty());
        assert!(repo
            .add_association(&s, &Association::new("/missing", "/r", "x"))
            .is_err());
    }

    #[test]
    fn test_paged_listing() {
        let (s, repo) = setup();
        for name in ["a", "b", "c", "d"] {
            repo.put(&s, &format!("/dir/{}", name), Resource::new("x"))
                .unwrap();
        }
        let page = get(&repo, &s, "/dir;start:1;pageLen:2").unwrap();
        assert_eq!(page.children, vec!["/dir/b", "/dir/c"]);
        assert!(repo
            .get(&s, &PathAddress::parse("/dir;start:x"))
            .is_err());
    }

    #[test]
    fn test_query_filters_by_property() {
        let (s, repo) = setup();
        repo.put(&s, "/q/a", Resource::new("x").with_property("team", "red"))
            .unwrap();
        repo.put(
            &s,
            "/q/b",
            Resource::new("x")
                .with_property("team", "blue")
                .with_media_type("text/plain"),
        )
        .unwrap();
        let mut params = BTreeMap::new();
        params.insert("team".to_string(), "blue".to_string());
        assert_eq!(repo.execute_query(&s, "/q", &params).unwrap(), vec!["/q/b"]);
        params.insert(MEDIA_TYPE_QUERY_PARAM.to_string(), "text/xml".to_string());
        assert!(repo.execute_query(&s, "/q", &params).unwrap().is_empty());
    }

    #[test]
    fn test_tenants_are_isolated() {
        let repo = MemRepository::new();
        let one = Session::new(TenantId(1));
        let two = Session::new(TenantId(2));
        repo.put(&one, "/a", Resource::new("x")).unwrap();
        assert!(get(&repo, &two, "/a").is_none());
    }

    #[test]
    fn test_simulated_write_error() {
        let (s, repo) = setup();
        repo.set_simulate_write_error(true);
        assert!(matches!(
            repo.put(&s, "/a", Resource::new("x")).unwrap_err(),
            RegistryError::Storage(_)
        ));
        assert!(get(&repo, &s, "/a").is_none());
    }
}
