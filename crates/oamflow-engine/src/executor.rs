//! Scheduler / executor
//!
//! One [`WorkflowExecutor::execute_tick`] call advances a run by a
//! single reconcile: eligible steps are selected per the run's mode,
//! gated on their `if` condition, fed their bound inputs, dispatched to
//! providers under a deadline, and their outcomes folded back into the
//! run status. The context commits before the caller persists status,
//! so recovery never observes status ahead of context.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::expr::evaluate_if;
use crate::features::FeatureGates;
use crate::record::RecordExporter;
use crate::task::{TaskKind, TaskRunner};
use futures::future::join_all;
use oamflow_api::{
    parse_duration, StepPhase, StepReason, StepStatus, WorkflowMode, WorkflowRun,
    WorkflowRunStatus, WorkflowStepStatus, STEP_TYPE_SUSPEND,
};
use oamflow_context::WorkflowContext;
use oamflow_providers::{PhaseDecision, ProviderContext, ProviderOutcome};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Memory-store key prefix for per-step failure counters
const CONTEXT_PREFIX_FAILED_TIMES: &str = "failed-times";

/// Memory-store key prefix for requeue backoff counters
const CONTEXT_PREFIX_BACKOFF_TIMES: &str = "backoff-times";

/// Outcome of one reconcile tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickResult {
    /// Every step settled; the run will not change again
    pub finished: bool,

    /// The run is suspended awaiting an operator or a timer
    pub suspended: bool,

    /// The run was terminated
    pub terminated: bool,

    /// Hint for the enclosing controller's requeue delay
    pub requeue_after: Option<Duration>,
}

/// Identity and user data of the run being executed
struct RunInfo {
    name: String,
    namespace: String,
    context: Value,
}

/// Result of executing one top-level step this tick
struct StepResult {
    entry: WorkflowStepStatus,
    suspend: bool,
}

/// Drives workflow runs, one reconcile tick at a time
pub struct WorkflowExecutor {
    config: EngineConfig,
    features: FeatureGates,
    record_exporter: Option<Arc<dyn RecordExporter>>,
}

impl WorkflowExecutor {
    /// Create an executor with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            features: FeatureGates::default(),
            record_exporter: None,
        }
    }

    /// Override the feature gates
    pub fn with_features(mut self, features: FeatureGates) -> Self {
        self.features = features;
        self
    }

    /// Install a finished-run exporter
    pub fn with_record_exporter(mut self, exporter: Arc<dyn RecordExporter>) -> Self {
        self.record_exporter = Some(exporter);
        self
    }

    /// Advance the run by one reconcile tick
    pub async fn execute_tick(
        &self,
        run: &mut WorkflowRun,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
        tasks: &[TaskRunner],
    ) -> Result<TickResult> {
        let info = RunInfo {
            name: run.metadata.name.clone(),
            namespace: run.metadata.namespace_or_default().to_string(),
            context: Value::Object(
                run.spec
                    .context
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<_, _>>(),
            ),
        };
        let mode = run.execute_mode();
        let mut status = run.status.take().unwrap_or_default();

        if status.mode.is_none() {
            status.mode = Some(mode.clone());
        }
        if status.start_time.is_none() {
            status.start_time = Some(chrono::Utc::now());
        }
        if status.context_backend.is_none() {
            status.context_backend = Some(wf_ctx.lock().await.store_ref());
        }
        ensure_status_entries(&mut status, tasks);

        if status.terminated {
            finalize_terminated(&mut status);
            run.status = Some(status);
            return Ok(TickResult {
                finished: true,
                suspended: false,
                terminated: true,
                requeue_after: None,
            });
        }

        if status.finished {
            run.status = Some(status);
            return Ok(TickResult {
                finished: true,
                suspended: false,
                terminated: false,
                requeue_after: None,
            });
        }

        if status.suspend {
            let still_suspended = !auto_resume_elapsed(&mut status, tasks);
            if still_suspended {
                run.status = Some(status);
                return Ok(TickResult {
                    finished: false,
                    suspended: true,
                    terminated: false,
                    requeue_after: Some(self.wait_backoff(wf_ctx).await),
                });
            }
            status.suspend = false;
        }

        let eligible = eligible_tasks(mode.steps, tasks, &status);
        debug!(
            run = %info.name,
            eligible = ?eligible.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "scheduling tick"
        );

        let dispatches = eligible.iter().map(|task| {
            let entry = status
                .step(task.name())
                .cloned()
                .unwrap_or_default();
            self.execute_task(&info, task, entry, &status, wf_ctx)
        });
        let results: Vec<StepResult> = join_all(dispatches).await;

        for result in results {
            if result.suspend {
                status.suspend = true;
            }
            if let Some(slot) = status.step_mut(&result.entry.status.name) {
                *slot = result.entry;
            }
        }

        // context becomes durable before the caller persists status
        wf_ctx.lock().await.commit().await?;

        let remaining = eligible_tasks(mode.steps, tasks, &status);
        let in_flight = tasks.iter().any(|t| {
            status
                .step(t.name())
                .map(|s| matches!(s.status.phase, StepPhase::Running | StepPhase::Suspending))
                .unwrap_or(false)
        });

        if !status.suspend && remaining.is_empty() && !in_flight {
            status.finished = true;
            if status.end_time.is_none() {
                status.end_time = Some(chrono::Utc::now());
            }
            status.message = Some(if status.any_failed() {
                "workflow failed".to_string()
            } else {
                "workflow succeeded".to_string()
            });
            info!(run = %info.name, message = ?status.message, "workflow finished");
        }

        let tick = TickResult {
            finished: status.finished,
            suspended: status.suspend,
            terminated: false,
            requeue_after: self
                .compute_requeue(&status, tasks, wf_ctx)
                .await,
        };
        run.status = Some(status);

        if tick.finished && self.features.enable_persist_workflow_record {
            if let Some(exporter) = &self.record_exporter {
                if let Err(err) = exporter.export(run).await {
                    error!(run = %info.name, error = %err, "record export failed");
                }
            }
        }
        Ok(tick)
    }

    async fn execute_task(
        &self,
        info: &RunInfo,
        task: &TaskRunner,
        entry: WorkflowStepStatus,
        status: &WorkflowRunStatus,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> StepResult {
        match &task.kind {
            TaskKind::Step(_) => {
                let scope_status = status_scope(status);
                let (step_status, suspend) = self
                    .execute_step(info, task, entry.status, &scope_status, wf_ctx)
                    .await;
                StepResult {
                    entry: WorkflowStepStatus {
                        status: step_status,
                        sub_steps_status: entry.sub_steps_status,
                    },
                    suspend,
                }
            }
            TaskKind::Group { sub_tasks, mode } => {
                self.execute_group(info, task, entry, sub_tasks, *mode, status, wf_ctx)
                    .await
            }
        }
    }

    /// Per-step pipeline: gate, bind, dispatch, fold the outcome
    async fn execute_step(
        &self,
        info: &RunInfo,
        task: &TaskRunner,
        mut entry: StepStatus,
        scope_status: &Value,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> (StepStatus, bool) {
        let TaskKind::Step(provider) = &task.kind else {
            unreachable!("execute_step is only called for leaf tasks");
        };
        let step = &task.step;

        // gather input values leniently first: the gate may short-circuit
        // before a missing input becomes a failure
        let mut input_values = Map::new();
        {
            let ctx = wf_ctx.lock().await;
            for input in &step.inputs {
                if let Some(value) = ctx.get_var(&[input.from.as_str()]) {
                    input_values.insert(input.from.clone(), value.clone());
                }
            }
        }
        let scope = json!({
            "context": info.context,
            "inputs": Value::Object(input_values.clone()),
            "status": scope_status,
        });

        if let Some(cond) = &step.if_cond {
            match evaluate_if(&step.name, cond, &scope) {
                Ok(false) => {
                    entry.phase = StepPhase::Skipped;
                    entry.reason = Some(StepReason::Skip);
                    entry.message = Some("if condition evaluated to false".to_string());
                    return (entry, false);
                }
                Ok(true) => {}
                Err(err) => {
                    entry.message = Some(err.to_string());
                    return self.fail_step(entry, StepReason::Action, wf_ctx).await;
                }
            }
        }

        // strict input binding into the step properties
        let mut properties = step.properties.clone().unwrap_or_else(|| json!({}));
        for input in &step.inputs {
            let Some(value) = input_values.get(&input.from) else {
                entry.message = Some(format!("input {} has no producer value", input.from));
                return self
                    .fail_step(entry, StepReason::InputLookupFailed, wf_ctx)
                    .await;
            };
            let keys: Vec<&str> = input.parameter_key.split('.').collect();
            if let Err(err) = fill_property(&mut properties, &keys, value.clone()) {
                entry.message = Some(err);
                return self
                    .fail_step(entry, StepReason::InputLookupFailed, wf_ctx)
                    .await;
            }
        }

        let deadline = match step.parse_timeout() {
            Ok(deadline) => deadline.or(self.config.default_step_timeout),
            Err(err) => {
                entry.message = Some(err.to_string());
                return self.fail_step(entry, StepReason::Action, wf_ctx).await;
            }
        };

        entry.mark_executed();
        let provider_ctx = ProviderContext {
            run_name: info.name.clone(),
            namespace: info.namespace.clone(),
            step_name: step.name.clone(),
            step_id: entry.id.clone(),
            properties,
            context: wf_ctx.clone(),
            deadline,
        };

        let dispatched = match deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, provider.handle(&provider_ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        entry.phase = StepPhase::Failed;
                        entry.reason = Some(StepReason::Timeout);
                        entry.message = Some(format!("step exceeded deadline {deadline:?}"));
                        return (entry, false);
                    }
                }
            }
            None => provider.handle(&provider_ctx).await,
        };

        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(err) => ProviderOutcome::failed(err.to_string()),
        };
        self.fold_outcome(task, entry, outcome, wf_ctx).await
    }

    /// Turn a provider outcome into the step's next phase
    async fn fold_outcome(
        &self,
        task: &TaskRunner,
        mut entry: StepStatus,
        outcome: ProviderOutcome,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> (StepStatus, bool) {
        entry.message = outcome.message.clone();
        match outcome.decision {
            PhaseDecision::Done => {
                entry.phase = StepPhase::Succeeded;
                entry.reason = None;
                let mut ctx = wf_ctx.lock().await;
                for output in &task.step.outputs {
                    let keys: Vec<&str> = output.value_from.split('.').collect();
                    match lookup_path(&outcome.result, &keys) {
                        Some(value) => {
                            if let Err(err) =
                                ctx.set_var(value.clone(), &[output.name.as_str()])
                            {
                                warn!(
                                    step = %task.step.name,
                                    output = %output.name,
                                    error = %err,
                                    "failed to record step output"
                                );
                            }
                        }
                        None => debug!(
                            step = %task.step.name,
                            output = %output.name,
                            "declared output missing from step result"
                        ),
                    }
                }
                (entry, false)
            }
            PhaseDecision::Failed => self.fail_step(entry, StepReason::Execute, wf_ctx).await,
            PhaseDecision::Wait => {
                entry.phase = StepPhase::Running;
                entry.reason = Some(StepReason::Wait);
                (entry, false)
            }
            PhaseDecision::Suspend => {
                entry.phase = StepPhase::Suspending;
                entry.reason = Some(StepReason::Suspend);
                (entry, true)
            }
        }
    }

    /// Mark a step failed, consuming one unit of its retry budget. The
    /// given reason stands while retries remain; the failure becomes
    /// permanent with `FailedAfterRetries` once the budget is spent.
    /// Timeout and Terminate failures bypass this path and never retry.
    async fn fail_step(
        &self,
        mut entry: StepStatus,
        reason: StepReason,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> (StepStatus, bool) {
        entry.phase = StepPhase::Failed;
        let failures = wf_ctx
            .lock()
            .await
            .increase_count_value_in_memory(&[CONTEXT_PREFIX_FAILED_TIMES, entry.id.as_str()]);
        if failures + 1 >= self.config.error_retry_times {
            entry.reason = Some(StepReason::FailedAfterRetries);
        } else {
            entry.reason = Some(reason);
        }
        (entry, self.features.enable_suspend_on_failure)
    }

    /// Run a step group for one tick: schedule eligible substeps under
    /// the group's mode, then derive the group phase from its children
    #[allow(clippy::too_many_arguments)]
    async fn execute_group(
        &self,
        info: &RunInfo,
        task: &TaskRunner,
        mut entry: WorkflowStepStatus,
        sub_tasks: &[TaskRunner],
        mode: WorkflowMode,
        status: &WorkflowRunStatus,
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> StepResult {
        let scope_status = status_scope(status);

        if let Some(cond) = &task.step.if_cond {
            let scope = json!({
                "context": info.context,
                "inputs": {},
                "status": scope_status,
            });
            match evaluate_if(&task.step.name, cond, &scope) {
                Ok(false) => {
                    entry.status.phase = StepPhase::Skipped;
                    entry.status.reason = Some(StepReason::Skip);
                    for sub in &mut entry.sub_steps_status {
                        sub.phase = StepPhase::Skipped;
                        sub.reason = Some(StepReason::Skip);
                    }
                    return StepResult {
                        entry,
                        suspend: false,
                    };
                }
                Ok(true) => {}
                Err(err) => {
                    entry.status.message = Some(err.to_string());
                    let (status, suspend) = self
                        .fail_step(std::mem::take(&mut entry.status), StepReason::Action, wf_ctx)
                        .await;
                    entry.status = status;
                    return StepResult { entry, suspend };
                }
            }
        }

        entry.status.mark_executed();
        let eligible = eligible_sub_tasks(mode, sub_tasks, &entry.sub_steps_status);
        let dispatches = eligible.iter().map(|sub| {
            let sub_entry = entry
                .sub_step(sub.name())
                .cloned()
                .unwrap_or_default();
            self.execute_step(info, sub, sub_entry, &scope_status, wf_ctx)
        });
        let results = join_all(dispatches).await;

        let mut suspend = false;
        for (sub_status, sub_suspend) in results {
            suspend |= sub_suspend;
            if let Some(slot) = entry
                .sub_steps_status
                .iter_mut()
                .find(|s| s.name == sub_status.name)
            {
                *slot = sub_status;
            }
        }

        entry.status.phase = derive_group_phase(mode, sub_tasks, &entry.sub_steps_status);
        entry.status.reason = match entry.status.phase {
            StepPhase::Failed => Some(StepReason::FailedAfterRetries),
            StepPhase::Suspending => Some(StepReason::Suspend),
            _ => None,
        };
        StepResult { entry, suspend }
    }

    /// Backoff bound while the run waits on external progress
    async fn wait_backoff(&self, wf_ctx: &Arc<Mutex<WorkflowContext>>) -> Duration {
        let ticks = wf_ctx
            .lock()
            .await
            .increase_count_value_in_memory(&[CONTEXT_PREFIX_BACKOFF_TIMES, "wait"]);
        backoff_for(ticks, self.config.backoff_wait_state_max)
    }

    async fn compute_requeue(
        &self,
        status: &WorkflowRunStatus,
        tasks: &[TaskRunner],
        wf_ctx: &Arc<Mutex<WorkflowContext>>,
    ) -> Option<Duration> {
        if status.finished {
            return None;
        }
        let retrying = all_step_statuses(status).any(retryable_failure);
        if retrying {
            let ticks = wf_ctx
                .lock()
                .await
                .increase_count_value_in_memory(&[CONTEXT_PREFIX_BACKOFF_TIMES, "failed"]);
            return Some(backoff_for(ticks, self.config.backoff_failed_state_max));
        }
        let waiting = status.suspend
            || tasks.iter().any(|t| {
                status
                    .step(t.name())
                    .map(|s| {
                        matches!(s.status.phase, StepPhase::Running | StepPhase::Suspending)
                    })
                    .unwrap_or(false)
            });
        if waiting {
            return Some(self.wait_backoff(wf_ctx).await);
        }
        // more steps become eligible next tick
        Some(Duration::from_secs(1))
    }
}

/// Exponential backoff doubling per observation, capped at `max`
fn backoff_for(observations: i64, max: Duration) -> Duration {
    let exp = observations.clamp(0, 16) as u32;
    std::cmp::min(max, Duration::from_secs(1) * 2u32.pow(exp))
}

/// Make sure every task (and substep) has a status entry, so IDs are
/// pinned and observers see Pending steps
fn ensure_status_entries(status: &mut WorkflowRunStatus, tasks: &[TaskRunner]) {
    for task in tasks {
        if status.step(task.name()).is_none() {
            status.steps.push(WorkflowStepStatus {
                status: StepStatus::pending(task.id.clone(), &task.step),
                sub_steps_status: Vec::new(),
            });
        }
        if let Some(entry) = status.step_mut(task.name()) {
            for sub in task.sub_tasks() {
                if !entry.sub_steps_status.iter().any(|s| s.name == sub.name()) {
                    entry
                        .sub_steps_status
                        .push(StepStatus::pending(sub.id.clone(), &sub.step));
                }
            }
        }
    }
}

/// Whether a step in this phase should be dispatched (again). Failed
/// steps stay re-eligible until their retry budget marks them
/// `FailedAfterRetries`; only Timeout and Terminate are never retried.
fn needs_execution(step: &StepStatus) -> bool {
    match step.phase {
        StepPhase::Pending => true,
        StepPhase::Running => true,
        StepPhase::Failed => retryable_failure(step),
        StepPhase::Succeeded | StepPhase::Skipped | StepPhase::Suspending => false,
    }
}

fn retryable_failure(step: &StepStatus) -> bool {
    step.phase == StepPhase::Failed
        && !matches!(
            step.reason,
            Some(StepReason::Timeout)
                | Some(StepReason::Terminate)
                | Some(StepReason::FailedAfterRetries)
        )
}

fn phase_of<'a>(status: &'a WorkflowRunStatus, name: &str) -> Option<&'a StepStatus> {
    status.step(name).map(|s| &s.status)
}

/// Select the top-level tasks runnable this tick
fn eligible_tasks<'a>(
    mode: WorkflowMode,
    tasks: &'a [TaskRunner],
    status: &WorkflowRunStatus,
) -> Vec<&'a TaskRunner> {
    match mode {
        WorkflowMode::StepByStep => {
            for task in tasks {
                let Some(step) = phase_of(status, task.name()) else {
                    continue;
                };
                if step.phase.is_terminal() {
                    continue;
                }
                if needs_execution(step) {
                    return vec![task];
                }
                // suspended or permanently failed: nothing can run
                return Vec::new();
            }
            Vec::new()
        }
        WorkflowMode::Dag => {
            let producers: std::collections::HashMap<&str, &str> = tasks
                .iter()
                .flat_map(|t| {
                    t.step
                        .outputs
                        .iter()
                        .map(move |o| (o.name.as_str(), t.name()))
                })
                .collect();
            tasks
                .iter()
                .filter(|task| {
                    let Some(step) = phase_of(status, task.name()) else {
                        return false;
                    };
                    if !needs_execution(step) {
                        return false;
                    }
                    predecessors_terminal(task, &producers, status)
                })
                .collect()
        }
    }
}

/// Every explicit dependency and every input producer must be terminal
fn predecessors_terminal(
    task: &TaskRunner,
    producers: &std::collections::HashMap<&str, &str>,
    status: &WorkflowRunStatus,
) -> bool {
    let explicit = task.step.depends_on.iter().map(|s| s.as_str());
    let data = task
        .step
        .inputs
        .iter()
        .filter_map(|i| producers.get(i.from.as_str()).copied());
    for predecessor in explicit.chain(data) {
        if predecessor == task.name() {
            continue;
        }
        match phase_of(status, predecessor) {
            Some(step) if step.phase.is_terminal() => {}
            // unknown names do not gate; declared but unfinished ones do
            None => {}
            Some(_) => return false,
        }
    }
    true
}

/// Substep scheduling mirrors the top-level rules against the group's
/// own status list
fn eligible_sub_tasks<'a>(
    mode: WorkflowMode,
    sub_tasks: &'a [TaskRunner],
    sub_status: &[StepStatus],
) -> Vec<&'a TaskRunner> {
    let find = |name: &str| sub_status.iter().find(|s| s.name == name);
    match mode {
        WorkflowMode::StepByStep => {
            for sub in sub_tasks {
                let Some(step) = find(sub.name()) else { continue };
                if step.phase.is_terminal() {
                    continue;
                }
                if needs_execution(step) {
                    return vec![sub];
                }
                return Vec::new();
            }
            Vec::new()
        }
        WorkflowMode::Dag => {
            let producers: std::collections::HashMap<&str, &str> = sub_tasks
                .iter()
                .flat_map(|t| {
                    t.step
                        .outputs
                        .iter()
                        .map(move |o| (o.name.as_str(), t.name()))
                })
                .collect();
            sub_tasks
                .iter()
                .filter(|sub| {
                    let Some(step) = find(sub.name()) else {
                        return false;
                    };
                    if !needs_execution(step) {
                        return false;
                    }
                    let explicit = sub.step.depends_on.iter().map(|s| s.as_str());
                    let data = sub
                        .step
                        .inputs
                        .iter()
                        .filter_map(|i| producers.get(i.from.as_str()).copied());
                    explicit.chain(data).all(|pred| {
                        pred == sub.name()
                            || find(pred).map(|s| s.phase.is_terminal()).unwrap_or(true)
                    })
                })
                .collect()
        }
    }
}

/// Group phase from its substeps: suspending wins, then running work,
/// then failure, then success
fn derive_group_phase(
    mode: WorkflowMode,
    sub_tasks: &[TaskRunner],
    sub_status: &[StepStatus],
) -> StepPhase {
    if sub_status
        .iter()
        .any(|s| s.phase == StepPhase::Suspending)
    {
        return StepPhase::Suspending;
    }
    if sub_status.iter().all(|s| s.phase.is_terminal()) {
        return StepPhase::Succeeded;
    }
    let runnable = !eligible_sub_tasks(mode, sub_tasks, sub_status).is_empty();
    let in_flight = sub_status.iter().any(|s| s.phase == StepPhase::Running);
    if runnable || in_flight {
        return StepPhase::Running;
    }
    StepPhase::Failed
}

/// Flip time-bounded suspend steps whose duration has elapsed. Returns
/// true when the run may proceed again.
fn auto_resume_elapsed(status: &mut WorkflowRunStatus, tasks: &[TaskRunner]) -> bool {
    let now = chrono::Utc::now();
    let mut resumed_any = false;

    let mut resume = |step: &oamflow_api::WorkflowStep, entry: &mut StepStatus| {
        if entry.phase != StepPhase::Suspending || step.step_type != STEP_TYPE_SUSPEND {
            return;
        }
        let Some(duration) = step
            .properties
            .as_ref()
            .and_then(|p| p.get("duration"))
            .and_then(Value::as_str)
            .and_then(parse_duration)
        else {
            return;
        };
        let Some(since) = entry.last_execute_time else {
            return;
        };
        if now.signed_duration_since(since).num_milliseconds() >= duration.as_millis() as i64 {
            entry.phase = StepPhase::Succeeded;
            entry.reason = None;
            entry.message = Some("suspend duration elapsed".to_string());
            resumed_any = true;
        }
    };

    for task in tasks {
        for sub in task.sub_tasks() {
            if let Some(entry) = status.step_mut(task.name()) {
                if let Some(slot) = entry
                    .sub_steps_status
                    .iter_mut()
                    .find(|s| s.name == sub.name())
                {
                    resume(&sub.step, slot);
                }
            }
        }
        if let Some(entry) = status.step_mut(task.name()) {
            resume(&task.step, &mut entry.status);
        }
    }

    if !resumed_any {
        return false;
    }
    // groups holding a just-resumed substep go back to running
    for entry in &mut status.steps {
        if entry.status.phase == StepPhase::Suspending
            && !entry
                .sub_steps_status
                .iter()
                .any(|s| s.phase == StepPhase::Suspending)
            && !entry.sub_steps_status.is_empty()
        {
            entry.status.phase = StepPhase::Running;
            entry.status.reason = None;
        }
    }
    let still_suspending = all_step_statuses(status).any(|s| s.phase == StepPhase::Suspending);
    !still_suspending
}

/// Mark in-flight steps failed once the run is terminated; preserve
/// specific failure reasons
fn finalize_terminated(status: &mut WorkflowRunStatus) {
    let settle = |step: &mut StepStatus| match step.phase {
        StepPhase::Running | StepPhase::Suspending => {
            step.phase = StepPhase::Failed;
            step.reason = Some(StepReason::Terminate);
        }
        StepPhase::Failed => {
            if !matches!(
                step.reason,
                Some(StepReason::FailedAfterRetries) | Some(StepReason::Timeout)
            ) {
                step.reason = Some(StepReason::Terminate);
            }
        }
        _ => {}
    };
    for entry in &mut status.steps {
        settle(&mut entry.status);
        for sub in &mut entry.sub_steps_status {
            settle(sub);
        }
    }
    status.suspend = false;
    status.finished = true;
    if status.end_time.is_none() {
        status.end_time = Some(chrono::Utc::now());
    }
}

fn all_step_statuses(status: &WorkflowRunStatus) -> impl Iterator<Item = &StepStatus> {
    status
        .steps
        .iter()
        .flat_map(|s| std::iter::once(&s.status).chain(s.sub_steps_status.iter()))
}

/// The `status` section of the condition scope
fn status_scope(status: &WorkflowRunStatus) -> Value {
    let mut scope = Map::new();
    for step in all_step_statuses(status) {
        scope.insert(
            step.name.clone(),
            json!({
                "id": step.id,
                "phase": step.phase,
                "reason": step.reason,
                "message": step.message,
            }),
        );
    }
    Value::Object(scope)
}

/// Set a value at a dotted path inside a properties object
fn fill_property(
    properties: &mut Value,
    keys: &[&str],
    value: Value,
) -> std::result::Result<(), String> {
    let mut current = properties;
    for (i, key) in keys.iter().enumerate() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| format!("parameter key {} blocked by a non-object", keys.join(".")))?;
        if i == keys.len() - 1 {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        current = map.entry(key.to_string()).or_insert_with(|| json!({}));
    }
    Ok(())
}

/// Look up a dotted path inside a step result document
fn lookup_path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in keys {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}
