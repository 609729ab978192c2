//! Operator actions
//!
//! The four state-transition actions an operator can take on a running
//! workflow: suspend, resume, restart (full or from a failed step), and
//! terminate. Rollback is rejected. Every write re-reads the latest run
//! and retries on optimistic-concurrency conflicts.

use crate::dependency::get_step_dependency;
use crate::error::{EngineError, Result};
use crate::store::{ConflictBackoff, RunStore};
use oamflow_api::{
    StepPhase, StepReason, StepStatus, WorkflowRun, WorkflowRunStatus, WorkflowStep,
    WorkflowStepStatus, CONFIG_MAP_KEY_VARS, STEP_TYPE_SUSPEND,
};
use oamflow_context::{cleanup_memory_store, ConfigMapStore, ContextError, ValueTree};
use std::sync::Arc;
use tracing::info;

/// Operation handler for a workflow run
pub struct RunOperator {
    run_store: Arc<dyn RunStore>,
    cm_store: Arc<dyn ConfigMapStore>,
}

impl RunOperator {
    /// Create an operator over the given stores
    pub fn new(run_store: Arc<dyn RunStore>, cm_store: Arc<dyn ConfigMapStore>) -> Self {
        Self {
            run_store,
            cm_store,
        }
    }

    async fn get_run(&self, namespace: &str, name: &str) -> Result<WorkflowRun> {
        self.run_store
            .get(namespace, name)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(format!("{namespace}/{name}")))
    }

    /// Re-read, mutate, and write the run status until it sticks
    async fn mutate_status<F>(&self, namespace: &str, name: &str, mutate: F) -> Result<WorkflowRun>
    where
        F: Fn(&mut WorkflowRun) -> Result<()>,
    {
        let mut backoff = ConflictBackoff::new();
        loop {
            let mut run = self.get_run(namespace, name).await?;
            mutate(&mut run)?;
            match self.run_store.update_status(&run).await {
                Ok(run) => return Ok(run),
                Err(EngineError::Conflict(key)) => {
                    if !backoff.wait().await {
                        return Err(EngineError::Conflict(key));
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Pause the run. Idempotent.
    pub async fn suspend(&self, namespace: &str, name: &str) -> Result<()> {
        self.mutate_status(namespace, name, |run| {
            run.status_mut().suspend = true;
            Ok(())
        })
        .await?;
        info!(run = %name, "successfully suspend workflow");
        Ok(())
    }

    /// Resume a suspended run. Suspend-type steps currently suspending
    /// flip to Succeeded so the scheduler can move past them.
    pub async fn resume(&self, namespace: &str, name: &str) -> Result<()> {
        self.mutate_status(namespace, name, |run| {
            let status = run.status_mut();
            if status.terminated {
                return Err(EngineError::ResumeTerminated);
            }
            if !status.suspend {
                return Ok(());
            }
            status.suspend = false;
            for entry in &mut status.steps {
                resume_suspend_step(&mut entry.status);
                for sub in &mut entry.sub_steps_status {
                    resume_suspend_step(sub);
                }
            }
            Ok(())
        })
        .await?;
        info!(run = %name, "successfully resume workflow");
        Ok(())
    }

    /// Irrevocably cancel the run. In-flight steps fail with reason
    /// Terminate; specific failure reasons are preserved.
    pub async fn terminate(&self, namespace: &str, name: &str) -> Result<()> {
        self.mutate_status(namespace, name, |run| {
            let status = run.status_mut();
            status.terminated = true;
            status.suspend = false;
            for entry in &mut status.steps {
                terminate_step(&mut entry.status);
                for sub in &mut entry.sub_steps_status {
                    terminate_step(sub);
                }
            }
            Ok(())
        })
        .await?;
        info!(run = %name, "successfully terminate workflow");
        Ok(())
    }

    /// Restart the run: from scratch when `step` is empty, else replay
    /// the named failed step and everything downstream of it
    pub async fn restart(&self, namespace: &str, name: &str, step: &str) -> Result<()> {
        if step.is_empty() {
            self.restart_all(namespace, name).await?;
        } else {
            self.restart_from_step(namespace, name, step).await?;
        }
        info!(run = %name, "successfully restart workflow");
        Ok(())
    }

    /// Rollback is not supported for a WorkflowRun
    pub async fn rollback(&self, _namespace: &str, _name: &str) -> Result<()> {
        Err(EngineError::RollbackUnsupported)
    }

    async fn restart_all(&self, namespace: &str, name: &str) -> Result<()> {
        let run = self.get_run(namespace, name).await?;
        if let Some(backend) = run.status.as_ref().and_then(|s| s.context_backend.as_ref()) {
            match self.cm_store.delete(namespace, &backend.name).await {
                Ok(()) | Err(ContextError::StoreNotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.mutate_status(namespace, name, |run| {
            run.status = Some(WorkflowRunStatus::default());
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn restart_from_step(&self, namespace: &str, name: &str, step_name: &str) -> Result<()> {
        let mut backoff = ConflictBackoff::new();
        let (updated, steps, dependency) = loop {
            let mut run = self.get_run(namespace, name).await?;
            if run.spec.workflow_spec.is_none() {
                return Err(EngineError::MissingWorkflowSpec(name.to_string()));
            }
            let steps = run.steps().to_vec();
            let dependency = apply_partial_restart(&mut run, &steps, step_name)?;
            match self.run_store.update_status(&run).await {
                Ok(updated) => break (updated, steps, dependency),
                Err(EngineError::Conflict(key)) => {
                    if !backoff.wait().await {
                        return Err(EngineError::Conflict(key));
                    }
                }
                Err(err) => return Err(err),
            }
        };

        let Some(backend) = updated
            .status
            .as_ref()
            .and_then(|s| s.context_backend.as_ref())
        else {
            return Ok(());
        };

        let mut backoff = ConflictBackoff::new();
        loop {
            let mut cm = self
                .cm_store
                .get(namespace, &backend.name)
                .await?
                .ok_or_else(|| ContextError::StoreNotFound {
                    namespace: namespace.to_string(),
                    name: backend.name.clone(),
                })?;
            let mut vars = ValueTree::new(cm.get(CONFIG_MAP_KEY_VARS).unwrap_or_default())?;
            clear_context_vars(&steps, &mut vars, step_name, &dependency);
            cm.insert(CONFIG_MAP_KEY_VARS, vars.render()?);
            match self.cm_store.update(&cm).await {
                Ok(_) => return Ok(()),
                Err(ContextError::Conflict(key)) => {
                    if !backoff.wait().await {
                        return Err(ContextError::Conflict(key).into());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Purge a run's ephemeral state when the run itself is deleted
pub fn cleanup_run_memory(namespace: &str, name: &str) {
    cleanup_memory_store(name, namespace);
}

fn resume_suspend_step(step: &mut StepStatus) {
    if step.step_type == STEP_TYPE_SUSPEND && step.phase == StepPhase::Suspending {
        step.phase = StepPhase::Succeeded;
        step.reason = None;
    }
}

fn terminate_step(step: &mut StepStatus) {
    match step.phase {
        StepPhase::Failed => {
            if !matches!(
                step.reason,
                Some(StepReason::FailedAfterRetries) | Some(StepReason::Timeout)
            ) {
                step.reason = Some(StepReason::Terminate);
            }
        }
        StepPhase::Running | StepPhase::Suspending => {
            step.phase = StepPhase::Failed;
            step.reason = Some(StepReason::Terminate);
        }
        _ => {}
    }
}

/// Reset the target step and drop the status of everything downstream.
/// Returns the dependent set used for vars cleanup.
fn apply_partial_restart(
    run: &mut WorkflowRun,
    steps: &[WorkflowStep],
    step_name: &str,
) -> Result<Vec<String>> {
    let mode = run
        .status
        .as_ref()
        .and_then(|s| s.mode.clone())
        .unwrap_or_default();
    let status = run.status_mut();
    status.terminated = false;
    status.suspend = false;
    status.finished = false;
    status.end_time = None;
    status.message = None;

    let prior = status.steps.clone();
    let dag_steps = mode.steps == oamflow_api::WorkflowMode::Dag;
    let dag_subs = mode.sub_steps == oamflow_api::WorkflowMode::Dag;

    for entry in &prior {
        if entry.status.name == step_name {
            if entry.status.phase != StepPhase::Failed {
                return Err(EngineError::RestartNonFailedStep);
            }
            let dependency = get_step_dependency(steps, step_name, dag_steps);
            status.steps = delete_step_status(&dependency, &prior, step_name, false);
            return Ok(dependency);
        }
        for sub in &entry.sub_steps_status {
            if sub.name != step_name {
                continue;
            }
            if sub.phase != StepPhase::Failed {
                return Err(EngineError::RestartNonFailedStep);
            }
            let sub_dependency = get_step_dependency(steps, step_name, dag_subs);
            let step_dependency = get_step_dependency(steps, &entry.status.name, dag_steps);
            let mut remaining = delete_step_status(&step_dependency, &prior, step_name, true);
            if let Some(parent) = remaining
                .iter_mut()
                .find(|s| s.status.name == entry.status.name)
            {
                parent.sub_steps_status =
                    delete_sub_step_status(&sub_dependency, &entry.sub_steps_status, step_name);
                parent.status.phase = StepPhase::Running;
                parent.status.reason = None;
            }
            status.steps = remaining;
            return Ok(merge_unique(sub_dependency, step_dependency));
        }
    }
    Err(EngineError::StepNotFound(step_name.to_string()))
}

/// Remove the status of the target step and its dependents. With
/// `group` the target lives inside a kept group entry, so only the
/// dependents are dropped here.
fn delete_step_status(
    dependency: &[String],
    steps: &[WorkflowStepStatus],
    step_name: &str,
    group: bool,
) -> Vec<WorkflowStepStatus> {
    steps
        .iter()
        .filter(|entry| {
            let is_dependent = dependency.iter().any(|d| *d == entry.status.name);
            if group {
                !is_dependent
            } else {
                !is_dependent && entry.status.name != step_name
            }
        })
        .cloned()
        .collect()
}

fn delete_sub_step_status(
    dependency: &[String],
    sub_steps: &[StepStatus],
    step_name: &str,
) -> Vec<StepStatus> {
    sub_steps
        .iter()
        .filter(|sub| !dependency.iter().any(|d| *d == sub.name) && sub.name != step_name)
        .cloned()
        .collect()
}

fn merge_unique(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    for item in b {
        if !a.contains(&item) {
            a.push(item);
        }
    }
    a
}

/// Drop every top-level vars field produced by the restarted step or by
/// any of its dependents, so downstream steps cannot read stale outputs
pub fn clear_context_vars(
    steps: &[WorkflowStep],
    vars: &mut ValueTree,
    step_name: &str,
    dependency: &[String],
) {
    let mut outputs = Vec::new();
    let affected =
        |name: &str| name == step_name || dependency.iter().any(|d| d == name);
    for step in steps {
        if affected(&step.name) {
            outputs.extend(step.outputs.iter().map(|o| o.name.clone()));
        }
        for sub in &step.sub_steps {
            if affected(&sub.name) {
                outputs.extend(sub.outputs.iter().map(|o| o.name.clone()));
            }
        }
    }
    vars.remove_top_level(&outputs);
}
