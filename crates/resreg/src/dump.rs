//! # Dump and Restore
//!
//! A [`Dump`] is a portable JSON snapshot of a subtree. Entry paths are
//! stored relative to the dumped root (see [`crate::path::to_relative`]) and
//! each outgoing association is stored relative to the resource holding it
//! (see [`crate::path::relativize_association_path`]). Restoring under a
//! different root therefore moves the cross references along with the
//! resources.
//!
//! Symlinks are dumped as links and never followed. Versions, comments and
//! ratings are not part of a dump.

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::model::{Association, Resource};
use crate::path::{self, PathAddress, ROOT};
use crate::session::Session;
use crate::store::Repository;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpAssociation {
    pub kind: String,
    /// Target relative to the entry's own path.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpEntry {
    /// Path relative to the dump root. The root itself is `/`.
    pub path: String,
    pub resource: Resource,
    #[serde(default)]
    pub associations: Vec<DumpAssociation>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    /// Absolute path the dump was taken from.
    pub root: String,
    /// Entries in parent-before-child order.
    pub entries: Vec<DumpEntry>,
}

impl Dump {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshots the subtree at `root`.
pub fn collect(repository: &dyn Repository, session: &Session, root: &str) -> Result<Dump> {
    let root = path::normalize(root);
    let mut entries = Vec::new();
    let mut pending = vec![root.clone()];

    while let Some(current) = pending.pop() {
        let Some(mut resource) = repository.get(session, &PathAddress::new(&current))? else {
            if current == root {
                return Err(RegistryError::NotFound(root));
            }
            continue;
        };

        let associations = repository
            .get_associations(session, &current, None)?
            .into_iter()
            .filter(|a| a.source == current)
            .map(|a| DumpAssociation {
                target: path::relativize_association_path(&a.target, &current),
                kind: a.kind,
            })
            .collect();
        let tags = repository.get_tags(session, &current)?;

        if resource.is_collection && !resource.is_link() {
            // Reversed so the stack pops children in listing order.
            pending.extend(resource.children.iter().rev().cloned());
        }
        resource.children.clear();

        entries.push(DumpEntry {
            path: path::to_relative(&current, &root),
            resource,
            associations,
            tags,
        });
    }

    tracing::debug!(%root, entries = entries.len(), "subtree dumped");
    Ok(Dump { root, entries })
}

/// Writes `dump` beneath `root`. Existing resources at the same paths are
/// overwritten; anything else under `root` is left alone.
pub fn apply(repository: &dyn Repository, session: &Session, root: &str, dump: &Dump) -> Result<()> {
    let root = path::normalize(root);
    let target_of = |entry: &DumpEntry| path::to_absolute(&entry.path, &root);

    for entry in &dump.entries {
        let target = target_of(entry);
        if target == ROOT {
            continue;
        }
        match &entry.resource.link_target {
            Some(link) => repository.create_link(session, &target, link)?,
            None => {
                repository.put(session, &target, entry.resource.clone())?;
            }
        }
    }

    for entry in &dump.entries {
        let target = target_of(entry);
        for association in &entry.associations {
            let resolved = path::resolve_association_path(&association.target, &target);
            repository.add_association(
                session,
                &Association::new(target.clone(), resolved, association.kind.clone()),
            )?;
        }
        for tag in &entry.tags {
            repository.apply_tag(session, &target, tag)?;
        }
    }

    tracing::debug!(%root, entries = dump.entries.len(), "dump restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemRepository;

    fn populated() -> (Session, MemRepository) {
        let session = Session::default();
        let repo = MemRepository::new();
        repo.put(&session, "/src/a", Resource::new("alpha")).unwrap();
        repo.put(&session, "/src/dir/b", Resource::new("beta").with_property("k", "v"))
            .unwrap();
        repo.create_link(&session, "/src/link", "/src/a").unwrap();
        repo.add_association(&session, &Association::new("/src/a", "/src/dir/b", "depends"))
            .unwrap();
        repo.apply_tag(&session, "/src/dir/b", "important").unwrap();
        (session, repo)
    }

    #[test]
    fn test_collect_relativizes_paths() {
        let (session, repo) = populated();
        let dump = collect(&repo, &session, "/src").unwrap();
        let paths: Vec<&str> = dump.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/a", "/dir", "/dir/b", "/link"]);

        let a = &dump.entries[1];
        assert_eq!(
            a.associations,
            vec![DumpAssociation {
                kind: "depends".into(),
                target: "dir/b".into()
            }]
        );
        assert!(dump.entries[4].resource.is_link());
        assert_eq!(dump.entries[3].tags, vec!["important".to_string()]);
    }

    #[test]
    fn test_collect_missing_root() {
        let session = Session::default();
        let repo = MemRepository::new();
        let err = collect(&repo, &session, "/nope").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_restore_under_new_root() {
        let (session, repo) = populated();
        let dump = collect(&repo, &session, "/src").unwrap();
        apply(&repo, &session, "/copy", &dump).unwrap();

        let b = repo
            .get(&session, &PathAddress::new("/copy/dir/b"))
            .unwrap()
            .unwrap();
        assert_eq!(b.content_str(), Some("beta"));
        assert_eq!(b.property("k"), Some("v"));

        let assocs = repo.get_associations(&session, "/copy/a", None).unwrap();
        assert_eq!(assocs, vec![Association::new("/copy/a", "/copy/dir/b", "depends")]);
        assert_eq!(
            repo.get_tags(&session, "/copy/dir/b").unwrap(),
            vec!["important".to_string()]
        );

        let link = repo
            .get(&session, &PathAddress::new("/copy/link"))
            .unwrap()
            .unwrap();
        assert_eq!(link.link_target.as_deref(), Some("/src/a"));
    }

    #[test]
    fn test_json_round_trip_and_restore() {
        let (session, repo) = populated();
        let json = collect(&repo, &session, "/src").unwrap().to_json().unwrap();

        let other = MemRepository::new();
        let dump = Dump::from_json(&json).unwrap();
        apply(&other, &session, "/src", &dump).unwrap();
        assert_eq!(other.resource_count(&session), repo.resource_count(&session));
    }

    #[test]
    fn test_restore_root_dump_skips_root_entry() {
        let (session, repo) = populated();
        let dump = collect(&repo, &session, "/").unwrap();
        assert_eq!(dump.entries[0].path, "/");

        let other = MemRepository::new();
        apply(&other, &session, "/", &dump).unwrap();
        assert!(other
            .resource_exists(&session, &PathAddress::new("/src/dir/b"))
            .unwrap());
    }
}
