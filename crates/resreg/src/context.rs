//! # Request Context
//!
//! One [`RequestContext`] is created per registry call and threaded through
//! every handler and filter the pipeline consults. It carries the call's
//! inputs (path, resource, source/target paths, comment, rating, ...) and
//! accumulates its outputs: the processing-complete flag and a per-handler
//! log of execution outcomes.
//!
//! ## Lazy Fields
//!
//! The resource at the context path and its parent collection are fetched
//! from the repository on first access and memoized, at most once per
//! field. Filters may trigger this through a shared reference. A failing
//! lookup surfaces as a [`RegistryError::Resolution`] (a server error) and
//! aborts the pipeline.
//!
//! ## Ownership
//!
//! A context belongs to the calling thread for the duration of one
//! operation and is dropped when the operation returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::dump::Dump;
use crate::error::{RegistryError, Result};
use crate::model::{Comment, RatingValue, Resource};
use crate::path::{self, PathAddress};
use crate::pipeline::HandlerId;
use crate::session::{Session, TenantId};
use crate::store::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    /// Session-wide monotonically increasing execution id.
    pub execution_id: u64,
    pub outcome: ExecutionOutcome,
}

pub struct RequestContext<'s> {
    session: &'s Session,
    repository: Arc<dyn Repository>,
    path: PathAddress,
    resource: OnceCell<Option<Resource>>,
    parent_collection: OnceCell<Option<Resource>>,
    source_path: Option<String>,
    target_path: Option<String>,
    action: Option<String>,
    comment: Option<Comment>,
    rating: Option<RatingValue>,
    tag: Option<String>,
    query_parameters: BTreeMap<String, String>,
    dump: Option<Dump>,
    processing_complete: bool,
    simulated: bool,
    statuses: BTreeMap<HandlerId, Vec<ExecutionStatus>>,
    logging_enabled: bool,
}

impl<'s> RequestContext<'s> {
    pub fn new(session: &'s Session, repository: Arc<dyn Repository>, path: PathAddress) -> Self {
        Self {
            session,
            repository,
            path,
            resource: OnceCell::new(),
            parent_collection: OnceCell::new(),
            source_path: None,
            target_path: None,
            action: None,
            comment: None,
            rating: None,
            tag: None,
            query_parameters: BTreeMap::new(),
            dump: None,
            processing_complete: false,
            simulated: false,
            statuses: BTreeMap::new(),
            logging_enabled: true,
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.set_resource(resource);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_path = Some(source.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_path = Some(target.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_comment(mut self, comment: Comment) -> Self {
        self.comment = Some(comment);
        self
    }

    pub fn with_rating(mut self, rating: RatingValue) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_query_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.query_parameters = parameters;
        self
    }

    pub fn with_dump(mut self, dump: Dump) -> Self {
        self.dump = Some(dump);
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn tenant(&self) -> TenantId {
        self.session.tenant()
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn path(&self) -> &PathAddress {
        &self.path
    }

    /// Re-targets the context. Memoized lookups for the old path are dropped.
    pub fn set_path(&mut self, path: PathAddress) {
        self.path = path;
        self.resource = OnceCell::new();
        self.parent_collection = OnceCell::new();
    }

    /// The resource at the context path, fetched on first access.
    pub fn resource(&self) -> Result<Option<&Resource>> {
        let slot = self.resource.get_or_try_init(|| {
            self.repository
                .get(self.session, &self.path)
                .map_err(|e| RegistryError::resolution(self.path.to_string(), e))
        })?;
        Ok(slot.as_ref())
    }

    /// The resource already held by the context, without triggering a lookup.
    pub fn loaded_resource(&self) -> Option<&Resource> {
        self.resource.get().and_then(Option::as_ref)
    }

    pub fn set_resource(&mut self, resource: Resource) {
        self.resource = OnceCell::with_value(Some(resource));
    }

    pub fn take_resource(&mut self) -> Option<Resource> {
        self.resource.take().flatten()
    }

    pub fn parent_path(&self) -> Option<String> {
        path::parent(self.path.path())
    }

    /// The collection holding the context path, fetched on first access.
    pub fn parent_collection(&self) -> Result<Option<&Resource>> {
        let slot = self.parent_collection.get_or_try_init(|| {
            let Some(parent) = self.parent_path() else {
                return Ok(None);
            };
            self.repository
                .get(self.session, &PathAddress::new(&parent))
                .map_err(|e| RegistryError::resolution(parent, e))
        })?;
        Ok(slot.as_ref())
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    /// Operation qualifier: association kind, for example.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn comment(&self) -> Option<&Comment> {
        self.comment.as_ref()
    }

    pub fn rating(&self) -> Option<RatingValue> {
        self.rating
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn query_parameters(&self) -> &BTreeMap<String, String> {
        &self.query_parameters
    }

    pub fn dump(&self) -> Option<&Dump> {
        self.dump.as_ref()
    }

    pub fn is_processing_complete(&self) -> bool {
        self.processing_complete
    }

    pub fn set_processing_complete(&mut self, complete: bool) {
        self.processing_complete = complete;
    }

    /// True when a simulation handler satisfied the call without touching storage.
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn mark_simulated(&mut self) {
        self.simulated = true;
        self.processing_complete = true;
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub fn set_logging_enabled(&mut self, enabled: bool) {
        self.logging_enabled = enabled;
    }

    pub fn record_execution(
        &mut self,
        handler: &HandlerId,
        execution_id: u64,
        outcome: ExecutionOutcome,
    ) {
        self.statuses
            .entry(handler.clone())
            .or_default()
            .push(ExecutionStatus {
                execution_id,
                outcome,
            });
    }

    /// Outcomes recorded for one handler, in execution order.
    pub fn execution_statuses(&self, handler: &HandlerId) -> &[ExecutionStatus] {
        self.statuses.get(handler).map_or(&[], Vec::as_slice)
    }

    pub fn executed_handlers(&self) -> impl Iterator<Item = &HandlerId> {
        self.statuses.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemRepository;

    fn setup() -> (Session, Arc<MemRepository>) {
        let session = Session::default();
        let repo = Arc::new(MemRepository::new());
        repo.put(&session, "/a/b", Resource::new("hello")).unwrap();
        (session, repo)
    }

    #[test]
    fn test_resource_is_loaded_lazily() {
        let (session, repo) = setup();
        let ctx = RequestContext::new(&session, repo, PathAddress::new("/a/b"));
        assert!(ctx.loaded_resource().is_none());
        let loaded = ctx.resource().unwrap().unwrap();
        assert_eq!(loaded.content_str(), Some("hello"));
        assert!(ctx.loaded_resource().is_some());
    }

    #[test]
    fn test_provided_resource_is_not_refetched() {
        let (session, repo) = setup();
        let ctx = RequestContext::new(&session, repo, PathAddress::new("/a/b"))
            .with_resource(Resource::new("pending"));
        assert_eq!(
            ctx.resource().unwrap().unwrap().content_str(),
            Some("pending")
        );
    }

    #[test]
    fn test_parent_collection() {
        let (session, repo) = setup();
        let ctx = RequestContext::new(&session, repo, PathAddress::new("/a/b"));
        assert_eq!(ctx.parent_path().as_deref(), Some("/a"));
        let parent = ctx.parent_collection().unwrap().unwrap();
        assert!(parent.is_collection);
        assert_eq!(parent.children, vec!["/a/b".to_string()]);
    }

    #[test]
    fn test_set_path_resets_memoized_lookups() {
        let (session, repo) = setup();
        let mut ctx = RequestContext::new(&session, repo, PathAddress::new("/a/b"));
        assert!(ctx.resource().unwrap().is_some());
        ctx.set_path(PathAddress::new("/missing"));
        assert!(ctx.resource().unwrap().is_none());
    }

    #[test]
    fn test_record_execution() {
        let (session, repo) = setup();
        let mut ctx = RequestContext::new(&session, repo, PathAddress::new("/a/b"));
        let id = HandlerId::new("audit");
        ctx.record_execution(&id, 1, ExecutionOutcome::Success);
        ctx.record_execution(&id, 2, ExecutionOutcome::Failed("boom".into()));
        let statuses = ctx.execution_statuses(&id);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].outcome, ExecutionOutcome::Failed("boom".into()));
        assert!(ctx
            .execution_statuses(&HandlerId::new("other"))
            .is_empty());
    }
}
