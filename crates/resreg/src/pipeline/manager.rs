//! # Handler Pipeline
//!
//! [`HandlerPipeline`] holds registrations in two bands. High-priority
//! registrations run before normal ones. Within a band, registration order
//! is kept.
//!
//! ## Dispatch
//!
//! For an operation `K`, each registration whose method set contains `K`
//! has its filter evaluated. On a match the handler runs and an execution
//! status is recorded in the context. The loop stops as soon as the context
//! is marked complete or a handler produced a value. Producing a value also
//! marks the context complete.
//!
//! In evaluate-all mode nothing stops the loop. Every matching handler runs,
//! failures are recorded and logged, and the first failure is returned once
//! the loop ends. The first value produced wins.
//!
//! A filter failure aborts dispatch in both modes.
//!
//! ## Concurrency
//!
//! Registrations live in an immutable snapshot behind an [`ArcSwap`].
//! Dispatch works on one snapshot from start to end. Registration builds a
//! new snapshot and swaps it in with compare-and-swap, retrying on conflict.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::{ExecutionOutcome, RequestContext};
use crate::error::{RegistryError, Result};
use crate::pipeline::filter::{Filter, MatchAll};
use crate::pipeline::handler::{Handler, HandlerOutput};
use crate::pipeline::{HandlerId, Operation, OperationSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Tag grouping registrations so a whole set can be removed at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LifecyclePhase {
    #[default]
    Default,
    User,
    Named(String),
}

#[derive(Clone)]
pub struct HandlerRegistration {
    id: HandlerId,
    methods: OperationSet,
    filter: Arc<dyn Filter>,
    handler: Arc<dyn Handler>,
    phase: LifecyclePhase,
    priority: Priority,
}

impl HandlerRegistration {
    /// A registration for every operation kind, with a match-all filter.
    pub fn new(id: impl Into<HandlerId>, handler: impl Handler + 'static) -> Self {
        Self::shared(id, Arc::new(handler))
    }

    pub fn shared(id: impl Into<HandlerId>, handler: Arc<dyn Handler>) -> Self {
        Self {
            id: id.into(),
            methods: OperationSet::all(),
            filter: Arc::new(MatchAll),
            handler,
            phase: LifecyclePhase::Default,
            priority: Priority::Normal,
        }
    }

    pub fn methods(mut self, methods: OperationSet) -> Self {
        self.methods = methods;
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    pub fn applies_to(&self, operation: Operation) -> bool {
        self.methods.contains(operation)
    }

    pub fn lifecycle_phase(&self) -> &LifecyclePhase {
        &self.phase
    }

    pub fn handler_priority(&self) -> Priority {
        self.priority
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("id", &self.id)
            .field("methods", &self.methods)
            .field("phase", &self.phase)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Which part of a pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    High,
    Normal,
    All,
}

#[derive(Clone, Default)]
struct Snapshot {
    high: Vec<Arc<HandlerRegistration>>,
    normal: Vec<Arc<HandlerRegistration>>,
}

impl Snapshot {
    fn band(&self, band: Band) -> [&[Arc<HandlerRegistration>]; 2] {
        match band {
            Band::High => [self.high.as_slice(), &[]],
            Band::Normal => [&[], self.normal.as_slice()],
            Band::All => [self.high.as_slice(), self.normal.as_slice()],
        }
    }

    fn contains(&self, id: &HandlerId) -> bool {
        self.high.iter().chain(&self.normal).any(|r| r.id == *id)
    }
}

pub struct HandlerPipeline {
    snap: ArcSwap<Snapshot>,
    evaluate_all: AtomicBool,
}

impl Default for HandlerPipeline {
    fn default() -> Self {
        Self {
            snap: ArcSwap::from_pointee(Snapshot::default()),
            evaluate_all: AtomicBool::new(false),
        }
    }
}

impl HandlerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_evaluate_all(&self, evaluate_all: bool) {
        self.evaluate_all.store(evaluate_all, Ordering::Release);
    }

    pub fn evaluates_all(&self) -> bool {
        self.evaluate_all.load(Ordering::Acquire)
    }

    /// Adds a registration at the end of its band. Ids must be unique.
    pub fn register(&self, registration: HandlerRegistration) -> Result<()> {
        let registration = Arc::new(registration);
        self.update(|snap| {
            if snap.contains(&registration.id) {
                return Err(RegistryError::Config(format!(
                    "handler '{}' is already registered",
                    registration.id
                )));
            }
            match registration.priority {
                Priority::High => snap.high.push(registration.clone()),
                Priority::Normal => snap.normal.push(registration.clone()),
            }
            Ok(())
        })?;
        tracing::debug!(handler = %registration.id, priority = ?registration.priority, "handler registered");
        Ok(())
    }

    /// Removes one registration. Returns false when the id is unknown.
    pub fn remove(&self, id: &HandlerId) -> bool {
        self.retain(|r| r.id != *id) > 0
    }

    /// Removes every registration tagged with `phase`. Returns how many were removed.
    pub fn remove_phase(&self, phase: &LifecyclePhase) -> usize {
        self.retain(|r| r.phase != *phase)
    }

    /// Ids in dispatch order.
    pub fn registrations(&self) -> Vec<HandlerId> {
        let snap = self.snap.load_full();
        snap.high
            .iter()
            .chain(&snap.normal)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let snap = self.snap.load();
        snap.high.len() + snap.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch(&self, operation: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
        self.dispatch_band(operation, ctx, Band::All)
    }

    pub fn dispatch_band(
        &self,
        operation: Operation,
        ctx: &mut RequestContext<'_>,
        band: Band,
    ) -> Result<Option<HandlerOutput>> {
        let snap = self.snap.load_full();
        let evaluate_all = self.evaluates_all();
        let mut output = None;
        let mut first_error = None;

        for registration in snap.band(band).into_iter().flatten() {
            if !registration.applies_to(operation) {
                continue;
            }
            if !evaluate_all && ctx.is_processing_complete() {
                break;
            }
            if !registration.filter.evaluate(ctx, operation)? {
                continue;
            }

            let execution_id = ctx.session().next_execution_id();
            tracing::trace!(
                handler = %registration.id,
                %operation,
                path = %ctx.path(),
                execution_id,
                "invoking handler"
            );
            match registration.handler.handle(operation, ctx) {
                Ok(result) => {
                    ctx.record_execution(&registration.id, execution_id, ExecutionOutcome::Success);
                    if let Some(value) = result {
                        ctx.set_processing_complete(true);
                        output.get_or_insert(value);
                    }
                }
                Err(e) => {
                    ctx.record_execution(
                        &registration.id,
                        execution_id,
                        ExecutionOutcome::Failed(e.to_string()),
                    );
                    if !evaluate_all {
                        return Err(e);
                    }
                    tracing::warn!(handler = %registration.id, %operation, error = %e, "handler failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(output),
        }
    }

    fn retain(&self, keep: impl Fn(&HandlerRegistration) -> bool) -> usize {
        let mut removed = 0;
        // The closure may run more than once under contention.
        self.snap.rcu(|cur| {
            let mut next = Snapshot::clone(cur);
            next.high.retain(|r| keep(r));
            next.normal.retain(|r| keep(r));
            removed = cur.high.len() + cur.normal.len() - next.high.len() - next.normal.len();
            next
        });
        removed
    }

    fn update(&self, mut edit: impl FnMut(&mut Snapshot) -> Result<()>) -> Result<()> {
        loop {
            let cur = self.snap.load_full();
            let mut next = (*cur).clone();
            edit(&mut next)?;
            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use crate::path::PathAddress;
    use crate::pipeline::filter::UrlMatcher;
    use crate::session::Session;
    use crate::store::memory::MemRepository;
    use parking_lot::Mutex;

    /// Appends its name to a shared log on every call.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        complete: bool,
        fail: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                complete: false,
                fail: false,
            }
        }
    }

    impl Handler for Recorder {
        fn handle(&self, _op: Operation, ctx: &mut RequestContext<'_>) -> Result<Option<HandlerOutput>> {
            self.log.lock().push(self.name);
            if self.fail {
                return Err(RegistryError::Storage(format!("{} failed", self.name)));
            }
            if self.complete {
                ctx.set_processing_complete(true);
            }
            Ok(None)
        }
    }

    struct Answer(&'static str);

    impl Handler for Answer {
        fn get(&self, _ctx: &mut RequestContext<'_>) -> Result<Option<Resource>> {
            Ok(Some(Resource::new(self.0)))
        }
    }

    fn run(pipeline: &HandlerPipeline, op: Operation) -> (Result<Option<HandlerOutput>>, bool) {
        let session = Session::default();
        let mut ctx = RequestContext::new(&session, Arc::new(MemRepository::new()), PathAddress::new("/a"));
        let result = pipeline.dispatch(op, &mut ctx);
        (result, ctx.is_processing_complete())
    }

    fn log() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_high_priority_runs_first() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline
            .register(HandlerRegistration::new("a", Recorder::new("a", &log)))
            .unwrap();
        pipeline
            .register(HandlerRegistration::new("b", Recorder::new("b", &log)).priority(Priority::High))
            .unwrap();
        run(&pipeline, Operation::Put).0.unwrap();
        assert_eq!(*log.lock(), vec!["b", "a"]);
        assert_eq!(pipeline.registrations(), vec![HandlerId::new("b"), HandlerId::new("a")]);
    }

    #[test]
    fn test_completion_short_circuits() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        let mut a = Recorder::new("a", &log);
        a.complete = true;
        pipeline.register(HandlerRegistration::new("a", a)).unwrap();
        pipeline
            .register(HandlerRegistration::new("c", Recorder::new("c", &log)))
            .unwrap();
        let (result, complete) = run(&pipeline, Operation::Put);
        result.unwrap();
        assert!(complete);
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[test]
    fn test_result_short_circuits_and_completes() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline.register(HandlerRegistration::new("answer", Answer("first"))).unwrap();
        pipeline
            .register(HandlerRegistration::new("later", Recorder::new("later", &log)))
            .unwrap();
        let (result, complete) = run(&pipeline, Operation::Get);
        let resource = result.unwrap().and_then(HandlerOutput::into_resource).unwrap();
        assert_eq!(resource.content_str(), Some("first"));
        assert!(complete);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_method_set_and_filter_select_registrations() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline
            .register(
                HandlerRegistration::new("puts", Recorder::new("puts", &log))
                    .methods(OperationSet::of(&[Operation::Put])),
            )
            .unwrap();
        pipeline
            .register(
                HandlerRegistration::new("elsewhere", Recorder::new("elsewhere", &log))
                    .filter(UrlMatcher::new().any_operation("/elsewhere/.*").unwrap()),
            )
            .unwrap();
        let (result, complete) = run(&pipeline, Operation::Get);
        assert!(result.unwrap().is_none());
        assert!(!complete);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_handler_error_aborts_chain() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        let mut bad = Recorder::new("bad", &log);
        bad.fail = true;
        pipeline.register(HandlerRegistration::new("bad", bad)).unwrap();
        pipeline
            .register(HandlerRegistration::new("next", Recorder::new("next", &log)))
            .unwrap();
        assert!(run(&pipeline, Operation::Delete).0.is_err());
        assert_eq!(*log.lock(), vec!["bad"]);
    }

    #[test]
    fn test_evaluate_all_runs_every_handler() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline.set_evaluate_all(true);
        let mut first = Recorder::new("first", &log);
        first.complete = true;
        let mut bad = Recorder::new("bad", &log);
        bad.fail = true;
        pipeline.register(HandlerRegistration::new("first", first)).unwrap();
        pipeline.register(HandlerRegistration::new("bad", bad)).unwrap();
        pipeline
            .register(HandlerRegistration::new("audit", Recorder::new("audit", &log)))
            .unwrap();

        let session = Session::default();
        let mut ctx = RequestContext::new(&session, Arc::new(MemRepository::new()), PathAddress::new("/a"));
        let err = pipeline.dispatch(Operation::Put, &mut ctx).unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert_eq!(*log.lock(), vec!["first", "bad", "audit"]);
        assert!(matches!(
            ctx.execution_statuses(&HandlerId::new("bad"))[0].outcome,
            ExecutionOutcome::Failed(_)
        ));
        assert_eq!(
            ctx.execution_statuses(&HandlerId::new("audit"))[0].outcome,
            ExecutionOutcome::Success
        );
    }

    #[test]
    fn test_execution_ids_increase_across_handlers() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline.register(HandlerRegistration::new("x", Recorder::new("x", &log))).unwrap();
        pipeline.register(HandlerRegistration::new("y", Recorder::new("y", &log))).unwrap();
        let session = Session::default();
        let mut ctx = RequestContext::new(&session, Arc::new(MemRepository::new()), PathAddress::new("/a"));
        pipeline.dispatch(Operation::Put, &mut ctx).unwrap();
        let x = ctx.execution_statuses(&HandlerId::new("x"))[0].execution_id;
        let y = ctx.execution_statuses(&HandlerId::new("y"))[0].execution_id;
        assert!(y > x);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline.register(HandlerRegistration::new("x", Recorder::new("x", &log))).unwrap();
        let err = pipeline
            .register(HandlerRegistration::new("x", Recorder::new("x", &log)).priority(Priority::High))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_remove_and_remove_phase() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        pipeline.register(HandlerRegistration::new("x", Recorder::new("x", &log))).unwrap();
        for name in ["u1", "u2"] {
            pipeline
                .register(HandlerRegistration::new(name, Recorder::new(name, &log)).phase(LifecyclePhase::User))
                .unwrap();
        }
        assert_eq!(pipeline.remove_phase(&LifecyclePhase::User), 2);
        assert!(pipeline.remove(&HandlerId::new("x")));
        assert!(!pipeline.remove(&HandlerId::new("x")));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_concurrent_registration_keeps_every_entry() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        std::thread::scope(|s| {
            for t in 0..4 {
                let pipeline = &pipeline;
                let log = &log;
                s.spawn(move || {
                    for i in 0..25 {
                        let id = format!("h{}-{}", t, i);
                        pipeline
                            .register(HandlerRegistration::new(id.as_str(), Recorder::new("h", log)))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(pipeline.len(), 100);
    }

    #[test]
    fn test_concurrent_removal_counts_each_entry_once() {
        let log = log();
        let pipeline = HandlerPipeline::new();
        for i in 0..20 {
            let id = format!("h{}", i);
            pipeline
                .register(HandlerRegistration::new(id.as_str(), Recorder::new("h", &log)))
                .unwrap();
        }
        let removed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pipeline = &pipeline;
                    s.spawn(move || {
                        (0..20)
                            .filter(|i| pipeline.remove(&HandlerId::new(format!("h{}", i))))
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(removed, 20);
        assert!(pipeline.is_empty());
    }
}
