//! # Configuration
//!
//! Registry configuration is loaded with [`confique`] from a TOML file,
//! with environment variables taking priority over the file and compiled
//! defaults filling whatever is left.
//!
//! ## Available Settings
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | `chroot` | `RESREG_CHROOT` | none | Origin prefix applied to every path the facade sees |
//! | `evaluate_all_handlers` | `RESREG_EVALUATE_ALL_HANDLERS` | `false` | Run every matching base handler, even after completion |
//! | `activity_logging` | `RESREG_ACTIVITY_LOGGING` | `true` | Emit `resreg::activity` events for writes |
//! | `default_store.*` | `RESREG_STORE_*` | `default`, `mem://local`, `registry` | Store used when no mount owns a path |
//! | `stores` | | none | Additional named stores |
//! | `mounts` | | none | `path`, `target_path`, `store` triples |
//!
//! ## Example
//!
//! ```toml
//! chroot = "/_system/governance"
//!
//! [default_store]
//! name = "local"
//! url = "jdbc:h2:./registry"
//! username = "admin@carbon.super"
//!
//! [[stores]]
//! name = "remote"
//! url = "jdbc:mysql://db/registry"
//! username = "reg"
//!
//! [[mounts]]
//! path = "/_system/config"
//! target_path = "/_system/nodes"
//! store = "remote"
//! ```

use std::path::Path;

use confique::Config;
use serde::{Deserialize, Serialize};

use crate::cache::mounts::StoreDescriptor;
use crate::error::Result;

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    #[config(env = "RESREG_CHROOT")]
    pub chroot: Option<String>,

    #[config(env = "RESREG_EVALUATE_ALL_HANDLERS", default = false)]
    pub evaluate_all_handlers: bool,

    #[config(env = "RESREG_ACTIVITY_LOGGING", default = true)]
    pub activity_logging: bool,

    #[config(nested)]
    pub default_store: StoreConfig,

    pub stores: Option<Vec<StoreConfig>>,

    pub mounts: Option<Vec<MountConfig>>,
}

/// Connection settings of one backing store.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    #[config(env = "RESREG_STORE_NAME", default = "default")]
    pub name: String,

    #[config(env = "RESREG_STORE_URL", default = "mem://local")]
    pub url: String,

    #[config(env = "RESREG_STORE_USERNAME", default = "registry")]
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub path: String,
    pub target_path: String,
    /// Name of the owning store, either `default_store.name` or one of `stores`.
    pub store: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            url: "mem://local".to_string(),
            username: "registry".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor::new(&self.name, &self.url, &self.username)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            chroot: None,
            evaluate_all_handlers: false,
            activity_logging: true,
            default_store: StoreConfig::default(),
            stores: None,
            mounts: None,
        }
    }
}

impl RegistryConfig {
    /// Loads `path` (if it exists) under environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::builder().env().file(path.as_ref()).load()?;
        Ok(config)
    }

    /// Environment and defaults only.
    pub fn from_env() -> Result<Self> {
        Ok(Self::builder().env().load()?)
    }

    /// The configured chroot, ignoring identity origins (`""` and `/`).
    pub fn chroot(&self) -> Option<&str> {
        self.chroot
            .as_deref()
            .filter(|c| !c.is_empty() && *c != crate::path::ROOT)
    }
}
