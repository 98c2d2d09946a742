//! Per-tenant pipelines.
//!
//! The base pipeline holds the built-in handlers and is shared by every
//! tenant. Each tenant may also register its own handlers in a user
//! pipeline. A call runs through three layers:
//!
//! 1. the base pipeline's high-priority band (simulation),
//! 2. the tenant's user pipeline,
//! 3. the base pipeline's normal band (caching, URL handlers).
//!
//! A layer is skipped once the call is complete, unless that layer's
//! pipeline evaluates all handlers. A tenant without a user pipeline sees an
//! empty one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::RequestContext;
use crate::error::Result;
use crate::pipeline::handler::HandlerOutput;
use crate::pipeline::manager::{Band, HandlerPipeline};
use crate::pipeline::Operation;
use crate::session::TenantId;

#[derive(Default)]
pub struct TenantPipelines {
    base: HandlerPipeline,
    tenants: RwLock<HashMap<TenantId, Arc<HandlerPipeline>>>,
    empty: Arc<HandlerPipeline>,
}

impl TenantPipelines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> &HandlerPipeline {
        &self.base
    }

    /// The user pipeline of `tenant`, created on first use.
    pub fn user_pipeline(&self, tenant: TenantId) -> Arc<HandlerPipeline> {
        if let Some(pipeline) = self.tenants.read().get(&tenant) {
            return pipeline.clone();
        }
        self.tenants
            .write()
            .entry(tenant)
            .or_insert_with(|| {
                tracing::debug!(%tenant, "creating user pipeline");
                Arc::new(HandlerPipeline::new())
            })
            .clone()
    }

    /// The user pipeline of `tenant`, or an empty one if it never registered anything.
    pub fn lookup(&self, tenant: TenantId) -> Arc<HandlerPipeline> {
        self.tenants
            .read()
            .get(&tenant)
            .cloned()
            .unwrap_or_else(|| self.empty.clone())
    }

    pub fn remove_tenant(&self, tenant: TenantId) -> bool {
        self.tenants.write().remove(&tenant).is_some()
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.tenants.read().keys().copied().collect();
        tenants.sort();
        tenants
    }

    pub fn dispatch(&self, operation: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
        let user = self.lookup(ctx.tenant());
        let layers: [(&HandlerPipeline, Band); 3] = [
            (&self.base, Band::High),
            (user.as_ref(), Band::All),
            (&self.base, Band::Normal),
        ];

        let mut output = None;
        for (pipeline, band) in layers {
            if ctx.is_processing_complete() && !pipeline.evaluates_all() {
                continue;
            }
            if let Some(value) = pipeline.dispatch_band(operation, ctx, band)? {
                output.get_or_insert(value);
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathAddress;
    use crate::pipeline::handler::Handler;
    use crate::pipeline::manager::{HandlerRegistration, Priority};
    use crate::session::Session;
    use crate::store::memory::MemRepository;
    use parking_lot::Mutex;

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        complete: bool,
    }

    impl Handler for Tag {
        fn handle(&self, _op: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
            self.log.lock().push(self.name);
            if self.complete {
                ctx.set_processing_complete(true);
            }
            Ok(None)
        }
    }

    fn tag(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, complete: bool) -> Tag {
        Tag {
            name,
            log: log.clone(),
            complete,
        }
    }

    fn dispatch(pipelines: &TenantPipelines, tenant: TenantId) {
        let session = Session::new(tenant);
        let mut ctx = RequestContext::new(&session, Arc::new(MemRepository::new()), PathAddress::new("/a"));
        pipelines.dispatch(Operation::Put, &mut ctx).unwrap();
    }

    #[test]
    fn test_layer_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipelines = TenantPipelines::new();
        pipelines
            .base()
            .register(HandlerRegistration::new("base-normal", tag("base-normal", &log, false)))
            .unwrap();
        pipelines
            .base()
            .register(HandlerRegistration::new("base-high", tag("base-high", &log, false)).priority(Priority::High))
            .unwrap();
        pipelines
            .user_pipeline(TenantId(7))
            .register(HandlerRegistration::new("user", tag("user", &log, false)))
            .unwrap();
        dispatch(&pipelines, TenantId(7));
        assert_eq!(*log.lock(), vec!["base-high", "user", "base-normal"]);
    }

    #[test]
    fn test_user_completion_skips_base_normal_band() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipelines = TenantPipelines::new();
        pipelines
            .base()
            .register(HandlerRegistration::new("builtin", tag("builtin", &log, false)))
            .unwrap();
        pipelines
            .user_pipeline(TenantId(1))
            .register(HandlerRegistration::new("user", tag("user", &log, true)))
            .unwrap();
        dispatch(&pipelines, TenantId(1));
        assert_eq!(*log.lock(), vec!["user"]);
    }

    #[test]
    fn test_evaluate_all_base_still_runs_after_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipelines = TenantPipelines::new();
        pipelines.base().set_evaluate_all(true);
        pipelines
            .base()
            .register(HandlerRegistration::new("audit", tag("audit", &log, false)))
            .unwrap();
        pipelines
            .user_pipeline(TenantId(1))
            .register(HandlerRegistration::new("user", tag("user", &log, true)))
            .unwrap();
        dispatch(&pipelines, TenantId(1));
        assert_eq!(*log.lock(), vec!["user", "audit"]);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipelines = TenantPipelines::new();
        pipelines
            .user_pipeline(TenantId(1))
            .register(HandlerRegistration::new("one", tag("one", &log, false)))
            .unwrap();
        dispatch(&pipelines, TenantId(2));
        assert!(log.lock().is_empty());
        assert!(pipelines.lookup(TenantId(2)).is_empty());
        assert_eq!(pipelines.tenants(), vec![TenantId(1)]);
        assert!(pipelines.remove_tenant(TenantId(1)));
        dispatch(&pipelines, TenantId(1));
        assert!(log.lock().is_empty());
    }
}
