//! # Registry Facade
//!
//! [`Registry`] is the single entry point for registry operations. Every
//! method follows the same shape:
//!
//! 1. **Translate** incoming paths through the chroot, if one is set.
//! 2. **Build** a [`RequestContext`] carrying the call's inputs.
//! 3. **Dispatch** through the tenant pipelines (see [`TenantPipelines`]).
//! 4. **Fall back** to the backend when no handler completed the call.
//! 5. **Translate** returned paths back relative to the chroot.
//!
//! ## Completion Without Output
//!
//! A handler may complete a call without producing a value (the simulation
//! handler does this for every write). The facade then answers with a
//! neutral value: `None` / `false` / an empty list for reads, the requested
//! path for writes that return one, `-1` for [`Registry::create_version`],
//! and an empty dump for [`Registry::dump`].
//!
//! ## Activity Log
//!
//! Completed writes that were not simulated emit an `info` event with
//! target `resreg::activity`, unless activity logging is disabled.
//!
//! ## Caching
//!
//! Handlers and the fallback both see the backend through a
//! [`CachedRepository`], so reads are cache-first. The built-in caching
//! handler evicts stale entries before a write and the cached repository
//! evicts again after it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{CacheInvalidator, CacheStore, MountTable};
use crate::config::RegistryConfig;
use crate::context::RequestContext;
use crate::dump::{self, Dump};
use crate::error::{RegistryError, Result};
use crate::model::{Association, Comment, Rating, RatingValue, Resource};
use crate::path::{self, PathAddress};
use crate::pipeline::{builtin, HandlerOutput, Operation, TenantPipelines};
use crate::session::Session;
use crate::store::cached::CachedRepository;
use crate::store::Repository;

fn done(_: HandlerOutput) -> Option<()> {
    Some(())
}

pub struct Registry {
    repository: Arc<dyn Repository>,
    pipelines: TenantPipelines,
    invalidator: Arc<CacheInvalidator>,
    chroot: Option<String>,
    activity_logging: bool,
}

impl Registry {
    /// Wraps `backend` in a cache over `cache` and installs the built-in handlers.
    pub fn new(backend: Arc<dyn Repository>, cache: Arc<dyn CacheStore>, mounts: MountTable) -> Result<Self> {
        let invalidator = Arc::new(CacheInvalidator::new(cache, Arc::new(mounts)));
        let repository: Arc<dyn Repository> =
            Arc::new(CachedRepository::new(backend, invalidator.clone()));
        let pipelines = TenantPipelines::new();
        builtin::install(pipelines.base(), invalidator.clone())?;
        Ok(Self {
            repository,
            pipelines,
            invalidator,
            chroot: None,
            activity_logging: true,
        })
    }

    pub fn from_config(
        config: &RegistryConfig,
        backend: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let mounts = MountTable::from_config(config)?;
        let mut registry = Self::new(backend, cache, mounts)?.with_activity_logging(config.activity_logging);
        registry
            .pipelines
            .base()
            .set_evaluate_all(config.evaluate_all_handlers);
        if let Some(chroot) = config.chroot() {
            registry = registry.with_chroot(chroot);
        }
        tracing::debug!(
            chroot = ?registry.chroot,
            mounts = registry.invalidator.mounts().mounts().len(),
            "registry configured"
        );
        Ok(registry)
    }

    /// Scopes every path this registry sees beneath `chroot`.
    pub fn with_chroot(mut self, chroot: impl Into<String>) -> Self {
        let chroot = path::normalize(&chroot.into());
        self.chroot = (chroot != path::ROOT).then_some(chroot);
        self
    }

    pub fn with_activity_logging(mut self, enabled: bool) -> Self {
        self.activity_logging = enabled;
        self
    }

    pub fn pipelines(&self) -> &TenantPipelines {
        &self.pipelines
    }

    pub fn invalidator(&self) -> &Arc<CacheInvalidator> {
        &self.invalidator
    }

    /// The cache-backed repository handlers and fallbacks go through.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn chroot(&self) -> Option<&str> {
        self.chroot.as_deref()
    }

    pub fn get(&self, session: &Session, path: &str) -> Result<Option<Resource>> {
        let ctx = self.context(session, self.address(path));
        let resource = self.execute(
            Operation::Get,
            ctx,
            |o| o.into_resource().map(Some),
            None,
            |ctx| ctx.repository().get(ctx.session(), ctx.path()),
        )?;
        Ok(resource.map(|r| self.relative_resource(r)))
    }

    /// Writes `resource` at `path`, creating missing parent collections.
    /// Returns the path written.
    pub fn put(&self, session: &Session, path: &str, resource: Resource) -> Result<String> {
        let address = self.address(path);
        let requested = address.path().to_string();
        let ctx = self.context(session, address).with_resource(resource);
        let written = self.execute(Operation::Put, ctx, HandlerOutput::into_path, requested, |ctx| {
            let resource = ctx
                .take_resource()
                .ok_or_else(|| RegistryError::InvalidParameter("no resource to put".into()))?;
            ctx.repository().put(ctx.session(), ctx.path().path(), resource)
        })?;
        Ok(self.relative(&written))
    }

    /// Deletes `path` and everything beneath it.
    pub fn delete(&self, session: &Session, path: &str) -> Result<()> {
        let ctx = self.context(session, self.address(path));
        self.execute(Operation::Delete, ctx, done, (), |ctx| {
            ctx.repository().delete(ctx.session(), ctx.path().path())
        })
    }

    pub fn resource_exists(&self, session: &Session, path: &str) -> Result<bool> {
        let ctx = self.context(session, self.address(path));
        self.execute(Operation::ResourceExists, ctx, HandlerOutput::into_exists, false, |ctx| {
            ctx.repository().resource_exists(ctx.session(), ctx.path())
        })
    }

    pub fn move_resource(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        self.relocate(Operation::Move, session, source, target)
    }

    pub fn copy(&self, session: &Session, source: &str, target: &str) -> Result<String> {
        self.relocate(Operation::Copy, session, source, target)
    }

    fn relocate(&self, operation: Operation, session: &Session, source: &str, target: &str) -> Result<String> {
        let source = self.absolute(source);
        let target = self.absolute(target);
        let ctx = self
            .context(session, PathAddress::new(&source))
            .with_source(source)
            .with_target(target.clone());
        let moved = self.execute(operation, ctx, HandlerOutput::into_path, target, |ctx| {
            let (source, target) = (ctx.source_path().unwrap_or_default(), ctx.target_path().unwrap_or_default());
            match operation {
                Operation::Copy => ctx.repository().copy(ctx.session(), source, target),
                _ => ctx.repository().move_resource(ctx.session(), source, target),
            }
        })?;
        Ok(self.relative(&moved))
    }

    /// Renames the last segment of `source` to `new_name`.
    pub fn rename(&self, session: &Session, source: &str, new_name: &str) -> Result<String> {
        let source = self.absolute(source);
        let renamed = path::parent(&source)
            .map(|parent| path::join(&parent, new_name))
            .unwrap_or_default();
        let ctx = self
            .context(session, PathAddress::new(&source))
            .with_source(source)
            .with_target(new_name);
        let renamed = self.execute(Operation::Rename, ctx, HandlerOutput::into_path, renamed, |ctx| {
            let (source, name) = (ctx.source_path().unwrap_or_default(), ctx.target_path().unwrap_or_default());
            ctx.repository().rename(ctx.session(), source, name)
        })?;
        Ok(self.relative(&renamed))
    }

    /// Snapshots `path` as a new version. Returns the version number.
    pub fn create_version(&self, session: &Session, path: &str) -> Result<i64> {
        let ctx = self.context(session, self.address(path));
        self.execute(Operation::CreateVersion, ctx, HandlerOutput::into_version, -1, |ctx| {
            ctx.repository().create_version(ctx.session(), ctx.path().path())
        })
    }

    /// Restores a version given as `path;version:N`.
    pub fn restore_version(&self, session: &Session, version_path: &str) -> Result<()> {
        let ctx = self.context(session, self.address(version_path));
        self.execute(Operation::RestoreVersion, ctx, done, (), |ctx| {
            ctx.repository().restore_version(ctx.session(), ctx.path())
        })
    }

    /// Version paths of `path`, newest first.
    pub fn get_versions(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        let ctx = self.context(session, self.address(path));
        let versions = self.execute(Operation::GetVersions, ctx, HandlerOutput::into_paths, Vec::new(), |ctx| {
            ctx.repository().get_versions(ctx.session(), ctx.path().path())
        })?;
        Ok(self.relative_all(versions))
    }

    pub fn create_link(&self, session: &Session, path: &str, target: &str) -> Result<()> {
        let ctx = self
            .context(session, self.address(path))
            .with_target(self.absolute(target));
        self.execute(Operation::CreateLink, ctx, done, (), |ctx| {
            let target = ctx.target_path().unwrap_or_default();
            ctx.repository().create_link(ctx.session(), ctx.path().path(), target)
        })
    }

    pub fn remove_link(&self, session: &Session, path: &str) -> Result<()> {
        let ctx = self.context(session, self.address(path));
        self.execute(Operation::RemoveLink, ctx, done, (), |ctx| {
            ctx.repository().remove_link(ctx.session(), ctx.path().path())
        })
    }

    pub fn add_association(&self, session: &Session, source: &str, target: &str, kind: &str) -> Result<()> {
        self.associate(Operation::AddAssociation, session, source, target, kind)
    }

    pub fn remove_association(&self, session: &Session, source: &str, target: &str, kind: &str) -> Result<()> {
        self.associate(Operation::RemoveAssociation, session, source, target, kind)
    }

    fn associate(
        &self,
        operation: Operation,
        session: &Session,
        source: &str,
        target: &str,
        kind: &str,
    ) -> Result<()> {
        let ctx = self
            .context(session, self.address(source))
            .with_target(self.absolute(target))
            .with_action(kind);
        self.execute(operation, ctx, done, (), |ctx| {
            let association = Association::new(
                ctx.path().path(),
                ctx.target_path().unwrap_or_default(),
                ctx.action().unwrap_or_default(),
            );
            match operation {
                Operation::RemoveAssociation => ctx.repository().remove_association(ctx.session(), &association),
                _ => ctx.repository().add_association(ctx.session(), &association),
            }
        })
    }

    /// Associations where `path` is the source or the target, optionally of one kind.
    pub fn get_associations(&self, session: &Session, path: &str, kind: Option<&str>) -> Result<Vec<Association>> {
        let mut ctx = self.context(session, self.address(path));
        if let Some(kind) = kind {
            ctx = ctx.with_action(kind);
        }
        let associations = self.execute(
            Operation::GetAssociations,
            ctx,
            HandlerOutput::into_associations,
            Vec::new(),
            |ctx| ctx.repository().get_associations(ctx.session(), ctx.path().path(), ctx.action()),
        )?;
        Ok(associations
            .into_iter()
            .map(|a| Association::new(self.relative(&a.source), self.relative(&a.target), a.kind))
            .collect())
    }

    /// Adds a comment and returns its address (`path;comments:N`). The
    /// author defaults to the session user.
    pub fn add_comment(&self, session: &Session, path: &str, mut comment: Comment) -> Result<String> {
        if comment.author.is_none() {
            comment.author = session.user().map(str::to_string);
        }
        let address = self.address(path);
        let requested = address.path().to_string();
        let ctx = self.context(session, address).with_comment(comment);
        let added = self.execute(Operation::AddComment, ctx, HandlerOutput::into_path, requested, |ctx| {
            let comment = ctx
                .comment()
                .cloned()
                .ok_or_else(|| RegistryError::InvalidParameter("no comment to add".into()))?;
            ctx.repository().add_comment(ctx.session(), ctx.path().path(), comment)
        })?;
        Ok(self.relative(&added))
    }

    /// Rates `path` on behalf of the session user.
    pub fn rate_resource(&self, session: &Session, path: &str, value: u8) -> Result<()> {
        let user = session
            .user()
            .ok_or_else(|| RegistryError::Unauthorized("rating requires a session user".into()))?
            .to_string();
        let value = RatingValue::new(value)?;
        let ctx = self.context(session, self.address(path)).with_rating(value);
        self.execute(Operation::RateResource, ctx, done, (), |ctx| {
            ctx.repository()
                .rate_resource(ctx.session(), ctx.path().path(), Rating { user, value })
        })
    }

    pub fn apply_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        self.tag(Operation::ApplyTag, session, path, tag)
    }

    pub fn remove_tag(&self, session: &Session, path: &str, tag: &str) -> Result<()> {
        self.tag(Operation::RemoveTag, session, path, tag)
    }

    fn tag(&self, operation: Operation, session: &Session, path: &str, tag: &str) -> Result<()> {
        let ctx = self.context(session, self.address(path)).with_tag(tag);
        self.execute(operation, ctx, done, (), |ctx| {
            let (path, tag) = (ctx.path().path(), ctx.tag().unwrap_or_default());
            match operation {
                Operation::RemoveTag => ctx.repository().remove_tag(ctx.session(), path, tag),
                _ => ctx.repository().apply_tag(ctx.session(), path, tag),
            }
        })
    }

    /// Tags on `path`. Not intercepted by handlers.
    pub fn get_tags(&self, session: &Session, path: &str) -> Result<Vec<String>> {
        self.repository
            .get_tags(session, self.address(path).path())
    }

    /// Paths beneath `path` whose properties match every parameter.
    pub fn execute_query(
        &self,
        session: &Session,
        path: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let ctx = self
            .context(session, self.address(path))
            .with_query_parameters(parameters.clone());
        let paths = self.execute(Operation::ExecuteQuery, ctx, HandlerOutput::into_paths, Vec::new(), |ctx| {
            ctx.repository()
                .execute_query(ctx.session(), ctx.path().path(), ctx.query_parameters())
        })?;
        Ok(self.relative_all(paths))
    }

    /// Snapshots the subtree at `path`. The dump's root is reported
    /// relative to the chroot.
    pub fn dump(&self, session: &Session, path: &str) -> Result<Dump> {
        let address = self.address(path);
        let empty = Dump {
            root: address.path().to_string(),
            entries: Vec::new(),
        };
        let ctx = self.context(session, address);
        let mut dump = self.execute(Operation::Dump, ctx, HandlerOutput::into_dump, empty, |ctx| {
            dump::collect(&**ctx.repository(), ctx.session(), ctx.path().path())
        })?;
        dump.root = self.relative(&dump.root);
        Ok(dump)
    }

    /// Writes `dump` beneath `path`.
    pub fn restore(&self, session: &Session, path: &str, dump: &Dump) -> Result<()> {
        let ctx = self.context(session, self.address(path)).with_dump(dump.clone());
        self.execute(Operation::Restore, ctx, done, (), |ctx| {
            let dump = ctx
                .dump()
                .ok_or_else(|| RegistryError::InvalidParameter("no dump to restore".into()))?;
            dump::apply(&**ctx.repository(), ctx.session(), ctx.path().path(), dump)
        })
    }

    fn context<'s>(&self, session: &'s Session, path: PathAddress) -> RequestContext<'s> {
        RequestContext::new(session, self.repository.clone(), path).with_logging(self.activity_logging)
    }

    /// Dispatches `operation` and falls back to `fallback` when no handler
    /// completed it. `completed` answers calls completed without a value.
    fn execute<'s, T>(
        &self,
        operation: Operation,
        mut ctx: RequestContext<'s>,
        extract: fn(HandlerOutput) -> Option<T>,
        completed: T,
        fallback: impl FnOnce(&mut RequestContext<'s>) -> Result<T>,
    ) -> Result<T> {
        let output = self.pipelines.dispatch(operation, &mut ctx)?;
        let value = match output.and_then(extract) {
            Some(value) => value,
            None if ctx.is_processing_complete() => completed,
            None => fallback(&mut ctx)?,
        };
        self.log_activity(operation, &ctx);
        Ok(value)
    }

    fn log_activity(&self, operation: Operation, ctx: &RequestContext<'_>) {
        if !operation.is_mutating() || ctx.is_simulated() || !ctx.is_logging_enabled() {
            return;
        }
        tracing::info!(
            target: "resreg::activity",
            %operation,
            path = %ctx.path(),
            tenant = %ctx.tenant(),
            user = ctx.session().user().unwrap_or("anonymous"),
            "registry updated"
        );
    }

    fn absolute(&self, path: &str) -> String {
        match &self.chroot {
            Some(chroot) => path::to_absolute(path, chroot),
            None => path.to_string(),
        }
    }

    fn relative(&self, path: &str) -> String {
        match &self.chroot {
            Some(chroot) => path::to_relative(path, chroot),
            None => path.to_string(),
        }
    }

    fn relative_all(&self, paths: Vec<String>) -> Vec<String> {
        match &self.chroot {
            Some(_) => paths.iter().map(|p| self.relative(p)).collect(),
            None => paths,
        }
    }

    fn address(&self, path: &str) -> PathAddress {
        PathAddress::parse(&self.absolute(path))
    }

    fn relative_resource(&self, mut resource: Resource) -> Resource {
        if self.chroot.is_some() {
            resource.path = self.relative(&resource.path);
            resource.children = self.relative_all(std::mem::take(&mut resource.children));
            resource.link_target = resource.link_target.map(|t| self.relative(&t));
        }
        resource
    }
}
