//! Step-generation pipeline
//!
//! Turns the declarative step list of a run into task runners, one per
//! top-level step. IDs are reused from the run's status so a step keeps
//! its identity across controller restarts; only steps never seen
//! before are minted a fresh ID.

use crate::error::{EngineError, Result};
use crate::task::{TaskKind, TaskRunner};
use oamflow_api::{WorkflowRun, WorkflowRunStatus, WorkflowStep};
use oamflow_context::random_string;
use oamflow_providers::{Providers, ProviderError};
use std::sync::Arc;
use tracing::debug;

/// Length of generated step IDs
const STEP_ID_LEN: usize = 10;

/// Options for the step generator
#[derive(Clone)]
pub struct StepGeneratorOptions {
    /// Registry resolving step types to handlers
    pub providers: Arc<Providers>,
}

/// Generate task runners for every top-level step of a run
pub fn generate(run: &WorkflowRun, options: &StepGeneratorOptions) -> Result<Vec<TaskRunner>> {
    let mut tasks = Vec::with_capacity(run.steps().len());
    for step in run.steps() {
        tasks.push(generate_task_runner(run, step, options)?);
    }
    debug!(run = %run.metadata.name, tasks = tasks.len(), "generated task runners");
    Ok(tasks)
}

fn generate_task_runner(
    run: &WorkflowRun,
    step: &WorkflowStep,
    options: &StepGeneratorOptions,
) -> Result<TaskRunner> {
    let id = generate_step_id(run.status.as_ref(), &step.name);

    if step.is_group() {
        let mut sub_tasks = Vec::with_capacity(step.sub_steps.len());
        for sub_step in &step.sub_steps {
            let sub_id = generate_sub_step_id(run.status.as_ref(), &sub_step.name, &step.name);
            if sub_step.is_group() {
                return Err(EngineError::UnknownStepType(format!(
                    "{} (step groups do not nest)",
                    sub_step.step_type
                )));
            }
            sub_tasks.push(TaskRunner {
                step: sub_step.clone(),
                id: sub_id,
                kind: TaskKind::Step(lookup_provider(options, sub_step)?),
            });
        }
        return Ok(TaskRunner {
            step: step.clone(),
            id,
            kind: TaskKind::Group {
                sub_tasks,
                mode: run.execute_mode().sub_steps,
            },
        });
    }

    Ok(TaskRunner {
        step: step.clone(),
        id,
        kind: TaskKind::Step(lookup_provider(options, step)?),
    })
}

fn lookup_provider(
    options: &StepGeneratorOptions,
    step: &WorkflowStep,
) -> Result<Arc<dyn oamflow_providers::Provider>> {
    options.providers.get(&step.step_type).map_err(|e| match e {
        ProviderError::NotFound(t) => EngineError::UnknownStepType(t),
        other => EngineError::Provider(other),
    })
}

/// The stable ID for a top-level step: reuse the status entry's when one
/// exists, else mint a fresh one
fn generate_step_id(status: Option<&WorkflowRunStatus>, name: &str) -> String {
    if let Some(status) = status {
        for ss in &status.steps {
            if ss.status.name == name {
                return ss.status.id.clone();
            }
        }
    }
    random_string(STEP_ID_LEN)
}

/// Same rule for a substep, searched within its parent's status
fn generate_sub_step_id(
    status: Option<&WorkflowRunStatus>,
    name: &str,
    parent_step_name: &str,
) -> String {
    if let Some(status) = status {
        for ss in &status.steps {
            if ss.status.name == parent_step_name {
                for sub in &ss.sub_steps_status {
                    if sub.name == name {
                        return sub.id.clone();
                    }
                }
            }
        }
    }
    random_string(STEP_ID_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oamflow_api::{StepStatus, WorkflowStepStatus};
    use oamflow_providers::NoopProvider;

    fn options() -> StepGeneratorOptions {
        let mut providers = Providers::with_builtins();
        providers.register(NoopProvider::new("read-object"));
        StepGeneratorOptions {
            providers: Arc::new(providers),
        }
    }

    fn run_with_group() -> WorkflowRun {
        let mut group = WorkflowStep::new("batch", "step-group");
        group.sub_steps = vec![
            WorkflowStep::new("inner-a", "notify"),
            WorkflowStep::new("inner-b", "read-object"),
        ];
        WorkflowRun::new(
            "gen-test",
            vec![WorkflowStep::new("apply", "apply-component"), group],
        )
    }

    #[test]
    fn test_generate_produces_one_runner_per_step() {
        let run = run_with_group();
        let tasks = generate(&run, &options()).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name(), "apply");
        assert!(!tasks[0].is_group());
        assert!(tasks[1].is_group());
        assert_eq!(tasks[1].sub_tasks().len(), 2);
        for task in &tasks {
            assert_eq!(task.id.len(), STEP_ID_LEN);
        }
    }

    #[test]
    fn test_ids_are_reused_from_status() {
        let mut run = run_with_group();
        let apply = WorkflowStep::new("apply", "apply-component");
        let inner = WorkflowStep::new("inner-a", "notify");
        let batch = WorkflowStep::new("batch", "step-group");
        run.status_mut().steps = vec![
            WorkflowStepStatus {
                status: StepStatus::pending("keepapply1", &apply),
                sub_steps_status: vec![],
            },
            WorkflowStepStatus {
                status: StepStatus::pending("keepbatch1", &batch),
                sub_steps_status: vec![StepStatus::pending("keepinner1", &inner)],
            },
        ];

        let tasks = generate(&run, &options()).unwrap();
        assert_eq!(tasks[0].id, "keepapply1");
        assert_eq!(tasks[1].id, "keepbatch1");
        assert_eq!(tasks[1].sub_tasks()[0].id, "keepinner1");
        // the substep never seen before gets a fresh ID
        assert_ne!(tasks[1].sub_tasks()[1].id, "keepinner1");
        assert_eq!(tasks[1].sub_tasks()[1].id.len(), STEP_ID_LEN);
    }

    #[test]
    fn test_generate_is_stable_across_calls() {
        let mut run = run_with_group();
        let first = generate(&run, &options()).unwrap();

        // persist the generated IDs as a status, like a reconcile would
        run.status_mut().steps = first
            .iter()
            .map(|t| WorkflowStepStatus {
                status: StepStatus::pending(t.id.clone(), &t.step),
                sub_steps_status: t
                    .sub_tasks()
                    .iter()
                    .map(|s| StepStatus::pending(s.id.clone(), &s.step))
                    .collect(),
            })
            .collect();

        let second = generate(&run, &options()).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            for (sa, sb) in a.sub_tasks().iter().zip(b.sub_tasks().iter()) {
                assert_eq!(sa.id, sb.id);
            }
        }
    }

    #[test]
    fn test_unknown_step_type_is_an_error() {
        let run = WorkflowRun::new("bad", vec![WorkflowStep::new("x", "no-such-type")]);
        let err = generate(&run, &options()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStepType(_)));
    }

    #[test]
    fn test_sub_step_mode_follows_run_mode() {
        let run = run_with_group().with_mode(oamflow_api::WorkflowExecuteMode::step_by_step());
        let tasks = generate(&run, &options()).unwrap();
        match &tasks[1].kind {
            TaskKind::Group { mode, .. } => {
                assert_eq!(*mode, oamflow_api::WorkflowMode::StepByStep)
            }
            _ => panic!("expected group"),
        }
    }
}
