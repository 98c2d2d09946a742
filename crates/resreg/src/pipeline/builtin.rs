//! Built-in handlers installed in every base pipeline.

use std::sync::Arc;

use crate::cache::CacheInvalidator;
use crate::context::RequestContext;
use crate::error::{RegistryError, Result};
use crate::model::Resource;
use crate::path::{self, COMMENTS_PARAM, RATINGS_PARAM};
use crate::pipeline::filter::{SimulationFilter, UrlMatcher};
use crate::pipeline::handler::{Handler, HandlerOutput};
use crate::pipeline::manager::{HandlerPipeline, HandlerRegistration, Priority};
use crate::pipeline::{Operation, OperationSet};

pub const SIMULATION_HANDLER: &str = "builtin.simulation";
pub const CACHING_HANDLER: &str = "builtin.caching";
pub const COMMENT_URL_HANDLER: &str = "builtin.comment-url";
pub const RATING_URL_HANDLER: &str = "builtin.rating-url";

const COMMENT_URL_PATTERN: &str = ".+;comments:[0-9]+";
const RATING_URL_PATTERN: &str = ".+;ratings:[^;/]+";

/// Registers the built-in handlers, in dispatch order.
pub fn install(pipeline: &HandlerPipeline, invalidator: Arc<CacheInvalidator>) -> Result<()> {
    pipeline.register(
        HandlerRegistration::new(SIMULATION_HANDLER, SimulationHandler)
            .methods(OperationSet::mutating())
            .filter(SimulationFilter)
            .priority(Priority::High),
    )?;
    pipeline.register(
        HandlerRegistration::new(CACHING_HANDLER, CachingHandler::new(invalidator))
            .methods(OperationSet::mutating()),
    )?;
    pipeline.register(
        HandlerRegistration::new(COMMENT_URL_HANDLER, CommentUrlHandler)
            .methods(OperationSet::of(&[Operation::Get]))
            .filter(UrlMatcher::new().pattern(Operation::Get, COMMENT_URL_PATTERN)?),
    )?;
    pipeline.register(
        HandlerRegistration::new(RATING_URL_HANDLER, RatingUrlHandler)
            .methods(OperationSet::of(&[Operation::Get]))
            .filter(UrlMatcher::new().pattern(Operation::Get, RATING_URL_PATTERN)?),
    )?;
    Ok(())
}

/// Completes mutating operations without touching storage while the
/// session simulates. Reads pass through.
pub struct SimulationHandler;

impl Handler for SimulationHandler {
    fn handle(&self, operation: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
        if operation.is_mutating() {
            tracing::debug!(%operation, path = %ctx.path(), "simulated");
            ctx.mark_simulated();
        }
        Ok(None)
    }
}

/// Evicts cache entries a mutation is about to make stale.
pub struct CachingHandler {
    invalidator: Arc<CacheInvalidator>,
}

impl CachingHandler {
    pub fn new(invalidator: Arc<CacheInvalidator>) -> Self {
        Self { invalidator }
    }

    /// Paths touched by `operation`, each with whether its subtree is affected.
    fn affected(operation: Operation, ctx: &RequestContext<'_>) -> Vec<(String, bool)> {
        let path = ctx.path().path().to_string();
        match operation {
            Operation::Put
            | Operation::CreateVersion
            | Operation::AddAssociation
            | Operation::RemoveAssociation
            | Operation::AddComment
            | Operation::RateResource
            | Operation::ApplyTag
            | Operation::RemoveTag => vec![(path, false)],
            Operation::Delete
            | Operation::RestoreVersion
            | Operation::CreateLink
            | Operation::RemoveLink
            | Operation::Restore => vec![(path, true)],
            Operation::Move | Operation::Copy => {
                let source = ctx.source_path().map_or(path, str::to_string);
                let mut paths = Vec::with_capacity(2);
                if operation == Operation::Move {
                    paths.push((source, true));
                }
                if let Some(target) = ctx.target_path() {
                    paths.push((target.to_string(), true));
                }
                paths
            }
            Operation::Rename => {
                let source = ctx.source_path().map_or(path, str::to_string);
                let mut paths = Vec::with_capacity(2);
                if let (Some(parent), Some(name)) = (path::parent(&source), ctx.target_path()) {
                    paths.push((path::join(&parent, name), true));
                }
                paths.push((source, true));
                paths
            }
            Operation::Get
            | Operation::ResourceExists
            | Operation::GetVersions
            | Operation::GetAssociations
            | Operation::ExecuteQuery
            | Operation::Dump => Vec::new(),
        }
    }
}

impl Handler for CachingHandler {
    fn handle(&self, operation: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
        for (path, recursive) in Self::affected(operation, ctx) {
            self.invalidator.invalidate(ctx.session(), &path, recursive);
        }
        Ok(None)
    }
}

/// Serves `path;comments:N` as a plain-text resource holding the comment.
pub struct CommentUrlHandler;

impl Handler for CommentUrlHandler {
    fn get(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Resource>> {
        let raw = ctx.path().parameter_value(COMMENTS_PARAM).unwrap_or_default();
        let id = raw
            .parse::<u64>()
            .map_err(|_| RegistryError::InvalidParameter(format!("invalid comment id '{}'", raw)))?;
        let comment = ctx
            .repository()
            .get_comment(ctx.session(), ctx.path().path(), id)?;
        let Some(comment) = comment else {
            ctx.set_processing_complete(true);
            return Ok(None);
        };

        let mut resource = Resource::new(comment.text).with_media_type("text/plain");
        resource.path = ctx.path().to_string();
        resource.created_at = comment.created_at;
        resource.updated_at = comment.created_at;
        if let Some(author) = comment.author {
            resource.add_property("author", author);
        }
        Ok(Some(resource))
    }
}

/// Serves `path;ratings:user` as a plain-text resource holding the rating.
pub struct RatingUrlHandler;

impl Handler for RatingUrlHandler {
    fn get(&self, ctx: &mut RequestContext<'_>) -> Result<Option<Resource>> {
        let user = ctx
            .path()
            .parameter_value(RATINGS_PARAM)
            .unwrap_or_default()
            .to_string();
        let rating = ctx
            .repository()
            .get_rating(ctx.session(), ctx.path().path(), &user)?;
        let Some(rating) = rating else {
            ctx.set_processing_complete(true);
            return Ok(None);
        };

        let mut resource = Resource::new(rating.get().to_string())
            .with_media_type("text/plain")
            .with_property("user", user);
        resource.path = ctx.path().to_string();
        Ok(Some(resource))
    }
}
