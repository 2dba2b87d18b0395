//! Dependency-ordered execution with a bounded worker pool.
//!
//! A single coordinating thread owns the stack state and the schedule; a
//! rayon pool runs provider calls for operations whose prerequisites have
//! all completed. Workers report back over a channel, and only the
//! coordinator mutates state, so there is no concurrent mutation anywhere.
//! Failures cascade to dependents as skips while independent branches keep
//! executing. Cancellation stops dispatch but lets in-flight operations
//! finish, so the state blob never loses a completed operation.

use crate::error::{Error, Result};
use crate::planner::{Plan, PlannedOp, content_hash};
use crate::provider::{Created, OpContext, Provider, ProviderSet};
use crate::resource::resolve_properties;
use crate::state::StackState;
use crate::types::{ExecuteOptions, OpKind, OpOutcome, OpRecord, RunReport, SkipReason};
use anyhow::Context as _;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Progress hooks invoked from the coordinating thread.
pub trait ProgressCallback: Send {
    fn on_run_start(&mut self, changes: usize) {
        let _ = changes;
    }
    fn on_op_start(&mut self, name: &str, kind: OpKind) {
        let _ = (name, kind);
    }
    fn on_op_complete(&mut self, name: &str, kind: OpKind, outcome: &OpOutcome) {
        let _ = (name, kind, outcome);
    }
    fn on_run_complete(&mut self) {}
}

/// No-op progress callback.
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

enum WorkerOk {
    Created(Created),
    Updated(BTreeMap<String, Value>),
    Deleted,
}

struct WorkerMsg {
    idx: usize,
    result: anyhow::Result<WorkerOk>,
    timed_out: bool,
    elapsed: Duration,
}

struct Job<'a> {
    name: String,
    kind: OpKind,
    properties: BTreeMap<String, Value>,
    physical_id: Option<String>,
    provider: &'a dyn Provider,
    /// Provider for the delete half of a replace, when the type changed.
    delete_provider: &'a dyn Provider,
}

/// Execute a plan against the providers, converging `state`.
///
/// Resource-level failures never abort the run; they are recorded and
/// cascaded. The returned report has one record per resource, including the
/// plan-time rejections.
pub fn execute(
    plan: Plan,
    providers: &ProviderSet,
    state: &mut StackState,
    opts: &ExecuteOptions,
    progress: &mut dyn ProgressCallback,
    cancel: &AtomicBool,
) -> Result<RunReport> {
    let Plan { ops, rejected } = plan;

    let index: BTreeMap<&str, usize> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| (op.name.as_str(), i))
        .collect();

    // Barrier bookkeeping: an op becomes ready when every op it waits on
    // has completed successfully.
    let mut pending = vec![0usize; ops.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
    for (i, op) in ops.iter().enumerate() {
        for wait in &op.waits_on {
            if let Some(&j) = index.get(wait.as_str()) {
                pending[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut outcomes: Vec<Option<OpOutcome>> = (0..ops.len()).map(|_| None).collect();
    let mut resolved_inputs: Vec<Option<(BTreeMap<String, Value>, String)>> =
        (0..ops.len()).map(|_| None).collect();
    let mut dispatched = vec![false; ops.len()];
    let mut ready: VecDeque<usize> = (0..ops.len()).filter(|&i| pending[i] == 0).collect();
    let mut in_flight = 0usize;

    progress.on_run_start(ops.iter().filter(|op| op.kind.is_change()).count());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Executor(format!("failed to build worker pool: {e}")))?;
    let (tx, rx) = mpsc::channel::<WorkerMsg>();

    pool.in_place_scope(|scope| {
        loop {
            while let Some(i) = ready.pop_front() {
                if outcomes[i].is_some() {
                    continue;
                }
                if cancel.load(Ordering::SeqCst) {
                    // Stop dispatching; whatever is still running drains
                    // below and the sweep marks the rest as cancelled.
                    ready.clear();
                    break;
                }

                let op = &ops[i];
                if op.kind == OpKind::NoOp {
                    let outcome = OpOutcome::Done;
                    progress.on_op_complete(&op.name, op.kind, &outcome);
                    outcomes[i] = Some(outcome);
                    settle_success(i, &dependents, &mut pending, &outcomes, &mut ready);
                    continue;
                }

                match build_job(op, state, providers) {
                    Ok((job, resolved, hash)) => {
                        debug_assert!(!dispatched[i], "operation dispatched twice");
                        dispatched[i] = true;
                        resolved_inputs[i] = Some((resolved, hash));
                        in_flight += 1;
                        progress.on_op_start(&op.name, op.kind);

                        let tx = tx.clone();
                        let timeout = opts.op_timeout;
                        scope.spawn(move |_| {
                            let started = Instant::now();
                            let ctx = OpContext::with_timeout(timeout);
                            let result = run_op(&job, &ctx);
                            let _ = tx.send(WorkerMsg {
                                idx: i,
                                result,
                                timed_out: ctx.expired(),
                                elapsed: started.elapsed(),
                            });
                        });
                    }
                    Err(error) => {
                        log::warn!("{}: not dispatched: {error}", op.name);
                        let outcome = OpOutcome::Failed(error);
                        progress.on_op_complete(&op.name, op.kind, &outcome);
                        outcomes[i] = Some(outcome);
                        cascade_failure(i, &ops, &dependents, &mut outcomes, progress);
                    }
                }
            }

            if in_flight == 0 {
                break;
            }
            let Ok(msg) = rx.recv() else {
                break;
            };
            in_flight -= 1;
            let i = msg.idx;
            let op = &ops[i];
            let outcome = settle_result(op, msg, &mut resolved_inputs[i], state);
            progress.on_op_complete(&op.name, op.kind, &outcome);
            let succeeded = outcome.is_success();
            outcomes[i] = Some(outcome);
            if succeeded {
                settle_success(i, &dependents, &mut pending, &outcomes, &mut ready);
            } else {
                cascade_failure(i, &ops, &dependents, &mut outcomes, progress);
            }
        }
    });

    // Anything left without an outcome was never dispatched: cancellation.
    for (i, op) in ops.iter().enumerate() {
        if outcomes[i].is_none() {
            let outcome = OpOutcome::Skipped(SkipReason::Cancelled);
            progress.on_op_complete(&op.name, op.kind, &outcome);
            outcomes[i] = Some(outcome);
        }
    }
    progress.on_run_complete();

    state.finish_run();

    let mut report = RunReport::default();
    report.records.extend(rejected);
    for (op, outcome) in ops.into_iter().zip(outcomes) {
        report.records.push(OpRecord {
            name: op.name,
            kind: op.kind,
            outcome: outcome.unwrap_or(OpOutcome::Skipped(SkipReason::Cancelled)),
        });
    }
    Ok(report)
}

/// Resolve references against the live state and look up providers.
/// Errors here are per-resource and cascade like any other failure.
fn build_job<'a>(
    op: &PlannedOp,
    state: &StackState,
    providers: &'a ProviderSet,
) -> Result<(Job<'a>, BTreeMap<String, Value>, String)> {
    let provider = providers.get(&op.resource_type).ok_or_else(|| {
        Error::validation(
            &op.name,
            format!("no provider registered for type '{}'", op.resource_type),
        )
    })?;

    let record = state.get(&op.name);
    let physical_id = record.and_then(|r| r.physical_id.clone());
    if matches!(op.kind, OpKind::Update) && physical_id.is_none() {
        return Err(Error::state_conflict(
            &op.name,
            "recorded resource has no physical identifier",
        ));
    }

    // The delete half of a replace goes through the provider the resource
    // was created with, which differs from `op.resource_type` on a type
    // change.
    let delete_provider = match record.map(|r| r.resource_type.as_str()) {
        Some(old_type) if old_type != op.resource_type => {
            providers.get(old_type).ok_or_else(|| {
                Error::validation(
                    &op.name,
                    format!("no provider registered for type '{old_type}'"),
                )
            })?
        }
        _ => provider,
    };

    let resolved = resolve_properties(&op.properties, &|r| state.attribute(r));
    let hash = content_hash(&resolved);

    Ok((
        Job {
            name: op.name.clone(),
            kind: op.kind,
            properties: resolved.clone(),
            physical_id,
            provider,
            delete_provider,
        },
        resolved,
        hash,
    ))
}

fn run_op(job: &Job<'_>, ctx: &OpContext) -> anyhow::Result<WorkerOk> {
    match job.kind {
        OpKind::Create => job
            .provider
            .create(ctx, &job.name, &job.properties)
            .map(WorkerOk::Created),
        OpKind::Update => {
            let id = job
                .physical_id
                .as_deref()
                .context("recorded resource has no physical identifier")?;
            job.provider
                .update(ctx, id, &job.properties)
                .map(WorkerOk::Updated)
        }
        OpKind::Replace => {
            if let Some(id) = job.physical_id.as_deref() {
                job.delete_provider
                    .delete(ctx, id)
                    .context("tearing down old resource for replacement")?;
            }
            job.provider
                .create(ctx, &job.name, &job.properties)
                .map(WorkerOk::Created)
        }
        OpKind::Delete => match job.physical_id.as_deref() {
            Some(id) => job.provider.delete(ctx, id).map(|()| WorkerOk::Deleted),
            // Never created: there is nothing physical to remove.
            None => Ok(WorkerOk::Deleted),
        },
        OpKind::NoOp => unreachable!("no-ops are settled without dispatch"),
    }
}

/// Translate a worker message into an outcome, updating state on success.
/// Runs on the coordinating thread.
fn settle_result(
    op: &PlannedOp,
    msg: WorkerMsg,
    resolved: &mut Option<(BTreeMap<String, Value>, String)>,
    state: &mut StackState,
) -> OpOutcome {
    if msg.timed_out {
        if msg.result.is_ok() {
            // The provider finished after the deadline; the result is
            // discarded and the next run re-converges.
            log::warn!(
                "{}: completed after its deadline ({:?}); result discarded",
                op.name,
                msg.elapsed
            );
        }
        return OpOutcome::Failed(Error::Timeout {
            name: op.name.clone(),
            elapsed: msg.elapsed,
        });
    }

    match msg.result {
        Ok(WorkerOk::Created(created)) => {
            let (properties, hash) = resolved.take().unwrap_or_default();
            state.record_created(
                &op.name,
                &op.resource_type,
                properties,
                hash,
                op.dependencies.clone(),
                created.physical_id,
                created.attributes,
            );
            OpOutcome::Done
        }
        Ok(WorkerOk::Updated(attributes)) => {
            let (properties, hash) = resolved.take().unwrap_or_default();
            state.record_updated(&op.name, properties, hash, op.dependencies.clone(), attributes);
            OpOutcome::Done
        }
        Ok(WorkerOk::Deleted) => {
            state.record_deleted(&op.name);
            OpOutcome::Done
        }
        Err(error) => OpOutcome::Failed(Error::provider(&op.name, format!("{error:#}"))),
    }
}

fn settle_success(
    i: usize,
    dependents: &[Vec<usize>],
    pending: &mut [usize],
    outcomes: &[Option<OpOutcome>],
    ready: &mut VecDeque<usize>,
) {
    for &d in &dependents[i] {
        pending[d] = pending[d].saturating_sub(1);
        if pending[d] == 0 && outcomes[d].is_none() {
            ready.push_back(d);
        }
    }
}

/// Mark every transitive dependent of `i` as skipped, naming the immediate
/// prerequisite that dragged it down.
fn cascade_failure(
    i: usize,
    ops: &[PlannedOp],
    dependents: &[Vec<usize>],
    outcomes: &mut [Option<OpOutcome>],
    progress: &mut dyn ProgressCallback,
) {
    let mut queue: VecDeque<(usize, usize)> =
        dependents[i].iter().map(|&d| (d, i)).collect();
    while let Some((d, parent)) = queue.pop_front() {
        if outcomes[d].is_some() {
            continue;
        }
        let outcome = OpOutcome::Skipped(SkipReason::DependencyFailed {
            dependency: ops[parent].name.clone(),
        });
        progress.on_op_complete(&ops[d].name, ops[d].kind, &outcome);
        outcomes[d] = Some(outcome);
        queue.extend(dependents[d].iter().map(|&next| (next, d)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::resource::ResourceDecl;
    use std::sync::Mutex;

    /// Records call order and fails on request.
    struct ScriptedProvider {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(name: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(name.to_string()),
            }
        }

        fn log(&self, entry: String) {
            self.calls.lock().expect("calls lock").push(entry);
        }
    }

    impl Provider for ScriptedProvider {
        fn create(
            &self,
            _ctx: &OpContext,
            name: &str,
            _properties: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Created> {
            if self.fail_on.as_deref() == Some(name) {
                anyhow::bail!("scripted failure");
            }
            self.log(format!("create:{name}"));
            Ok(Created {
                physical_id: format!("phys-{name}"),
                attributes: BTreeMap::new(),
            })
        }

        fn update(
            &self,
            _ctx: &OpContext,
            physical_id: &str,
            _properties: &BTreeMap<String, Value>,
        ) -> anyhow::Result<BTreeMap<String, Value>> {
            self.log(format!("update:{physical_id}"));
            Ok(BTreeMap::new())
        }

        fn delete(&self, _ctx: &OpContext, physical_id: &str) -> anyhow::Result<()> {
            self.log(format!("delete:{physical_id}"));
            Ok(())
        }

        fn read(
            &self,
            _ctx: &OpContext,
            _physical_id: &str,
        ) -> anyhow::Result<Option<BTreeMap<String, Value>>> {
            Ok(None)
        }
    }

    fn run(
        desired: &[ResourceDecl],
        state: &mut StackState,
        providers: &ProviderSet,
    ) -> RunReport {
        let plan = plan(desired, state, providers).expect("plan");
        execute(
            plan,
            providers,
            state,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &AtomicBool::new(false),
        )
        .expect("execute")
    }

    #[test]
    fn chain_executes_in_dependency_order() {
        let mut providers = ProviderSet::new();
        providers.register("bucket", Box::new(ScriptedProvider::new()));

        let desired = vec![
            ResourceDecl::new("c", "bucket").with_property("ref", "${b.id}"),
            ResourceDecl::new("b", "bucket").with_property("ref", "${a.id}"),
            ResourceDecl::new("a", "bucket"),
        ];
        let mut state = StackState::new();
        let report = run(&desired, &mut state, &providers);
        assert!(report.is_success());

        // References resolve only after the dependency completed, so the
        // recorded properties prove the barrier held.
        assert_eq!(
            state.get("b").unwrap().properties["ref"],
            Value::String("phys-a".into())
        );
        assert_eq!(
            state.get("c").unwrap().properties["ref"],
            Value::String("phys-b".into())
        );
    }

    #[test]
    fn failure_cascades_to_dependents_only() {
        let mut providers = ProviderSet::new();
        providers.register("bucket", Box::new(ScriptedProvider::failing_on("a")));

        let desired = vec![
            ResourceDecl::new("a", "bucket"),
            ResourceDecl::new("b", "bucket").with_dependency("a"),
            ResourceDecl::new("c", "bucket"),
        ];
        let mut state = StackState::new();
        let report = run(&desired, &mut state, &providers);

        assert!(matches!(
            report.record("a").unwrap().outcome,
            OpOutcome::Failed(Error::Provider { .. })
        ));
        assert!(matches!(
            &report.record("b").unwrap().outcome,
            OpOutcome::Skipped(SkipReason::DependencyFailed { dependency }) if dependency == "a"
        ));
        assert!(report.record("c").unwrap().outcome.is_success());
        assert!(state.contains("c"));
        assert!(!state.contains("a"));
        assert!(!state.contains("b"));
    }

    #[test]
    fn cancellation_skips_undispatched_operations() {
        let mut providers = ProviderSet::new();
        providers.register("bucket", Box::new(ScriptedProvider::new()));

        let desired = vec![
            ResourceDecl::new("a", "bucket"),
            ResourceDecl::new("b", "bucket"),
        ];
        let mut state = StackState::new();
        let plan = plan(&desired, &state, &providers).unwrap();

        let cancel = AtomicBool::new(true);
        let report = execute(
            plan,
            &providers,
            &mut state,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &cancel,
        )
        .unwrap();

        assert!(report.records.iter().all(|r| matches!(
            r.outcome,
            OpOutcome::Skipped(SkipReason::Cancelled)
        )));
        assert!(state.is_empty());
    }

    #[test]
    fn serial_advances_per_run() {
        let mut providers = ProviderSet::new();
        providers.register("bucket", Box::new(ScriptedProvider::new()));

        let mut state = StackState::new();
        run(&[ResourceDecl::new("a", "bucket")], &mut state, &providers);
        assert_eq!(state.serial, 1);
        run(&[ResourceDecl::new("a", "bucket")], &mut state, &providers);
        assert_eq!(state.serial, 2);
    }
}
