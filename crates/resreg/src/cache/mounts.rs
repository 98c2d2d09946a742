//! # Mount Table
//!
//! A mount aliases a logical path prefix onto a target path in some backing
//! store. The table keeps three lookups:
//!
//! - `db_configs`: physical target path → owning store.
//! - `db_configs_with_mounts`: logical mount path → owning store. Used when a
//!   path is addressed through its alias.
//! - `path_map`: logical mount path → physical target path.
//!
//! All prefix matching is segment-aware and picks the longest match.
//! The table is built once at startup and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::path::{self, PathAddress, SEPARATOR};

/// Identity of one backing store instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub name: String,
    pub url: String,
    pub username: String,
}

impl StoreDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            username: username.into(),
        }
    }

    /// Cache namespace of this store: the user name's local part, `@`, then the URL.
    pub fn connection_id(&self) -> String {
        let local = self
            .username
            .split_once('@')
            .map_or(self.username.as_str(), |(local, _)| local);
        format!("{}@{}", local, self.url)
    }
}

impl fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.connection_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub path: String,
    pub target_path: String,
    pub store: StoreDescriptor,
}

impl Mount {
    /// Maps a physical path under this mount's target back to its alias.
    pub fn alias_of(&self, physical: &str) -> Option<String> {
        let base = PathAddress::parse(physical);
        path::is_within(base.path(), &self.target_path)
            .then(|| rebase(physical, &self.target_path, &self.path))
    }
}

/// Which table a store resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMatch {
    /// The path lies under a physical target path.
    Target,
    /// The path lies under a logical mount path and was rewritten to its target.
    Alias,
}

#[derive(Debug, Clone)]
pub struct MountTable {
    default_store: StoreDescriptor,
    mounts: Vec<Mount>,
    db_configs: BTreeMap<String, StoreDescriptor>,
    db_configs_with_mounts: BTreeMap<String, StoreDescriptor>,
    path_map: BTreeMap<String, String>,
}

impl MountTable {
    pub fn new(default_store: StoreDescriptor) -> Self {
        Self {
            default_store,
            mounts: Vec::new(),
            db_configs: BTreeMap::new(),
            db_configs_with_mounts: BTreeMap::new(),
            path_map: BTreeMap::new(),
        }
    }

    pub fn with_mount(mut self, path: &str, target_path: &str, store: StoreDescriptor) -> Result<Self> {
        self.add_mount(path, target_path, store)?;
        Ok(self)
    }

    pub fn add_mount(&mut self, path: &str, target_path: &str, store: StoreDescriptor) -> Result<()> {
        for p in [path, target_path] {
            if !p.starts_with(SEPARATOR) {
                return Err(RegistryError::Config(format!(
                    "mount paths must be absolute, got '{}'",
                    p
                )));
            }
        }
        let path = path::normalize(path);
        let target_path = path::normalize(target_path);
        if self.path_map.contains_key(&path) {
            return Err(RegistryError::Config(format!(
                "'{}' is mounted twice",
                path
            )));
        }

        self.db_configs.insert(target_path.clone(), store.clone());
        self.db_configs_with_mounts
            .insert(path.clone(), store.clone());
        self.path_map.insert(path.clone(), target_path.clone());
        self.mounts.push(Mount {
            path,
            target_path,
            store,
        });
        Ok(())
    }

    /// Builds the table from configuration. Mounts must name a configured store.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let default_store = config.default_store.descriptor();
        let stores: BTreeMap<&str, StoreDescriptor> = config
            .stores
            .iter()
            .flatten()
            .map(|s| (s.name.as_str(), s.descriptor()))
            .collect();

        let mut table = Self::new(default_store);
        for mount in config.mounts.iter().flatten() {
            let store = if mount.store == table.default_store.name {
                table.default_store.clone()
            } else {
                stores.get(mount.store.as_str()).cloned().ok_or_else(|| {
                    RegistryError::Config(format!(
                        "mount '{}' references unknown store '{}'",
                        mount.path, mount.store
                    ))
                })?
            };
            table.add_mount(&mount.path, &mount.target_path, store)?;
        }
        Ok(table)
    }

    pub fn default_store(&self) -> &StoreDescriptor {
        &self.default_store
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Store owning a path that lies under a physical target path.
    pub fn store_for_target(&self, path: &str) -> Option<(&str, &StoreDescriptor)> {
        longest_prefix(&self.db_configs, path)
    }

    /// Store owning a path addressed through a logical mount path.
    pub fn store_for_mount(&self, path: &str) -> Option<(&str, &StoreDescriptor)> {
        longest_prefix(&self.db_configs_with_mounts, path)
    }

    pub fn target_of(&self, mount_path: &str) -> Option<&str> {
        self.path_map.get(mount_path).map(String::as_str)
    }

    /// Resolves the store owning `path` and the path as that store sees it.
    ///
    /// Physical target matches win over alias matches.
    pub fn resolve(&self, path: &str) -> Option<(StoreDescriptor, String, MountMatch)> {
        if let Some((_, store)) = self.store_for_target(path) {
            return Some((store.clone(), path.to_string(), MountMatch::Target));
        }
        let (mount_path, store) = self.store_for_mount(path)?;
        let target = self.target_of(mount_path)?;
        Some((
            store.clone(),
            rebase(path, mount_path, target),
            MountMatch::Alias,
        ))
    }

    /// Translates a logical path into its physical location, if it is mounted.
    ///
    /// Paths under a physical target are already physical and are not routed,
    /// matching the precedence of [`MountTable::resolve`].
    pub fn route(&self, path: &str) -> Option<(&Mount, String)> {
        if self.store_for_target(path).is_some() {
            return None;
        }
        self.mounts
            .iter()
            .filter(|m| path::is_within(path, &m.path))
            .max_by_key(|m| m.path.len())
            .map(|m| (m, rebase(path, &m.path, &m.target_path)))
    }
}

fn longest_prefix<'a>(
    table: &'a BTreeMap<String, StoreDescriptor>,
    path: &str,
) -> Option<(&'a str, &'a StoreDescriptor)> {
    table
        .iter()
        .filter(|(prefix, _)| path::is_within(path, prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, store)| (prefix.as_str(), store))
}

/// Replaces the `from` prefix of `path` with `to`.
fn rebase(path: &str, from: &str, to: &str) -> String {
    let rest = if from == path::ROOT {
        path
    } else {
        &path[from.len()..]
    };
    if rest.is_empty() {
        to.to_string()
    } else if to == path::ROOT {
        rest.to_string()
    } else {
        format!("{}{}", to, rest)
    }
}
