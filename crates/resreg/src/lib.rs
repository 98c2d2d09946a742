//! # Resreg Architecture
//!
//! Resreg is a hierarchical, versioned **resource registry** library. Nodes
//! are addressed by filesystem-like paths and carry content, properties,
//! versions and metadata (comments, ratings, tags, associations). Every
//! operation is routed through an interceptable handler pipeline, and reads
//! are served from a shared cache that stays consistent across mount
//! aliases and tenants.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Registry facade, one method per operation                │
//! │  - Chroot translation, fallback to the backend              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Pipeline Layer (pipeline/)                                 │
//! │  - Filters decide, handlers intercept                       │
//! │  - Base pipeline + one user pipeline per tenant             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Cache Layer (cache/, store/cached.rs)                      │
//! │  - Mount-aware invalidation, path-id allocation             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - Abstract Repository trait                                │
//! │  - MemRepository (testing, embedding)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No Thread-Local State
//!
//! Tenant, user, store override and the simulation flag live in an explicit
//! [`session::Session`] passed into every call. The registry itself is
//! `Send + Sync` and shared; sessions are per thread.
//!
//! ## Module Overview
//!
//! - [`api`]: The registry facade, entry point for all operations
//! - [`pipeline`]: Operations, filters, handlers and dispatch
//! - [`context`]: Per-call request context
//! - [`cache`]: Cache keys, cache stores, mounts and invalidation
//! - [`store`]: Repository trait, in-memory and cache-backed implementations
//! - [`path`]: Path addresses, chroot and association path translation
//! - [`dump`]: Portable subtree snapshots
//! - [`model`]: Core data types (`Resource`, `Association`, `Comment`, `Rating`)
//! - [`session`]: Tenant and simulation state of a caller
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod dump;
pub mod error;
pub mod model;
pub mod path;
pub mod pipeline;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use api::Registry;
pub use error::{RegistryError, Result};
pub use session::{Session, TenantId};
