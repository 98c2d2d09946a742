//! Handlers intercept registry operations.
//!
//! A [`Handler`] has one method per [`Operation`], each defaulting to a
//! no-op. Returning a value (`Some`) answers the call and ends the chain in
//! the default pipeline mode. A handler can also end the chain without a
//! value through [`RequestContext::set_processing_complete`].
//!
//! Handlers are shared across threads and must keep no per-call state.

use crate::context::RequestContext;
use crate::dump::Dump;
use crate::error::Result;
use crate::model::{Association, Resource};
use crate::pipeline::Operation;

/// A value produced by a handler in place of the storage backend.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Resource(Resource),
    Exists(bool),
    Path(String),
    Paths(Vec<String>),
    Version(i64),
    Associations(Vec<Association>),
    Dump(Dump),
}

impl HandlerOutput {
    pub fn into_resource(self) -> Option<Resource> {
        match self {
            HandlerOutput::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_exists(self) -> Option<bool> {
        match self {
            HandlerOutput::Exists(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_path(self) -> Option<String> {
        match self {
            HandlerOutput::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_paths(self) -> Option<Vec<String>> {
        match self {
            HandlerOutput::Paths(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_version(self) -> Option<i64> {
        match self {
            HandlerOutput::Version(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_associations(self) -> Option<Vec<Association>> {
        match self {
            HandlerOutput::Associations(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_dump(self) -> Option<Dump> {
        match self {
            HandlerOutput::Dump(d) => Some(d),
            _ => None,
        }
    }
}

#[allow(unused_variables)]
pub trait Handler: Send + Sync {
    fn get(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Resource>> {
        Ok(None)
    }

    fn put(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn delete(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn resource_exists(&self, ctx: &mut RequestContext<'_>) -> Result<Option<bool>> {
        Ok(None)
    }

    fn move_resource(&self, ctx: &mut RequestContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn copy(&self, ctx: &mut RequestContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn rename(&self, ctx: &mut RequestContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn create_version(&self, ctx: &mut RequestContext<'_>) -> Result<Option<i64>> {
        Ok(None)
    }

    fn restore_version(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn get_versions(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn create_link(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn remove_link(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn add_association(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn remove_association(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn get_associations(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Vec<Association>>> {
        Ok(None)
    }

    fn add_comment(&self, ctx: &mut RequestContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn rate_resource(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn apply_tag(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn remove_tag(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    fn execute_query(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn dump(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Dump>> {
        Ok(None)
    }

    fn restore(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Routes `operation` to its method. Handlers that treat every
    /// operation alike may override this instead.
    fn handle(&self, operation: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
        Ok(match operation {
            Operation::Get => self.get(ctx)?.map(HandlerOutput::Resource),
            Operation::Put => self.put(ctx).map(|_| None)?,
            Operation::Delete => self.delete(ctx).map(|_| None)?,
            Operation::ResourceExists => self.resource_exists(ctx)?.map(HandlerOutput::Exists),
            Operation::Move => self.move_resource(ctx)?.map(HandlerOutput::Path),
            Operation::Copy => self.copy(ctx)?.map(HandlerOutput::Path),
            Operation::Rename => self.rename(ctx)?.map(HandlerOutput::Path),
            Operation::CreateVersion => self.create_version(ctx)?.map(HandlerOutput::Version),
            Operation::RestoreVersion => self.restore_version(ctx).map(|_| None)?,
            Operation::GetVersions => self.get_versions(ctx)?.map(HandlerOutput::Paths),
            Operation::CreateLink => self.create_link(ctx).map(|_| None)?,
            Operation::RemoveLink => self.remove_link(ctx).map(|_| None)?,
            Operation::AddAssociation => self.add_association(ctx).map(|_| None)?,
            Operation::RemoveAssociation => self.remove_association(ctx).map(|_| None)?,
            Operation::GetAssociations => self
                .get_associations(ctx)?
                .map(HandlerOutput::Associations),
            Operation::AddComment => self.add_comment(ctx)?.map(HandlerOutput::Path),
            Operation::RateResource => self.rate_resource(ctx).map(|_| None)?,
            Operation::ApplyTag => self.apply_tag(ctx).map(|_| None)?,
            Operation::RemoveTag => self.remove_tag(ctx).map(|_| None)?,
            Operation::ExecuteQuery => self.execute_query(ctx)?.map(HandlerOutput::Paths),
            Operation::Dump => self.dump(ctx)?.map(HandlerOutput::Dump),
            Operation::Restore => self.restore(ctx).map(|_| None)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathAddress;
    use crate::session::Session;
    use crate::store::memory::MemRepository;
    use std::sync::Arc;

    struct Noop;
    impl Handler for Noop {}

    struct FixedGet;
    impl Handler for FixedGet {
        fn get(&self, _ctx: &mut RequestContext<'_>) -> Result<Option<Resource>> {
            Ok(Some(Resource::new("fixed")))
        }
    }

    #[test]
    fn test_default_methods_produce_nothing() {
        let session = Session::default();
        let mut ctx = RequestContext::new(
            &session,
            Arc::new(MemRepository::new()),
            PathAddress::new("/a"),
        );
        for op in Operation::ALL {
            assert!(Noop.handle(op, &mut ctx).unwrap().is_none(), "{}", op);
        }
        assert!(!ctx.is_processing_complete());
    }

    #[test]
    fn test_handle_routes_to_method() {
        let session = Session::default();
        let mut ctx = RequestContext::new(
            &session,
            Arc::new(MemRepository::new()),
            PathAddress::new("/a"),
        );
        let out = FixedGet.handle(Operation::Get, &mut ctx).unwrap();
        assert_eq!(
            out.and_then(HandlerOutput::into_resource)
                .and_then(|r| r.content_str().map(str::to_string)),
            Some("fixed".to_string())
        );
        assert!(FixedGet.handle(Operation::Put, &mut ctx).unwrap().is_none());
    }
}
