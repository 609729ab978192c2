//! WorkflowRun resource and status types

use crate::error::{ApiError, Result};
use crate::metadata::{ObjectMeta, ObjectReference, TypeMeta};
use crate::step::{StepPhase, WorkflowStep, WorkflowStepStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// WorkflowRun resource representing one execution of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Type metadata (apiVersion, kind)
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    /// Object metadata (name, namespace, owners, etc.)
    pub metadata: ObjectMeta,

    /// Run specification
    pub spec: WorkflowRunSpec,

    /// Run status (set by the engine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowRunStatus>,
}

impl WorkflowRun {
    /// Create a run with inline steps
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            type_meta: TypeMeta::workflow_run(),
            metadata: ObjectMeta::new(name),
            spec: WorkflowRunSpec {
                workflow_spec: Some(WorkflowSpec { steps }),
                ..Default::default()
            },
            status: None,
        }
    }

    /// Set the execution mode
    pub fn with_mode(mut self, mode: WorkflowExecuteMode) -> Self {
        self.spec.mode = Some(mode);
        self
    }

    /// Validate the run
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(ApiError::MissingField("metadata.name".to_string()));
        }
        match (&self.spec.workflow_ref, &self.spec.workflow_spec) {
            (Some(_), Some(_)) => Err(ApiError::Validation(
                "workflowRef and workflowSpec are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ApiError::MissingField(
                "spec.workflowRef or spec.workflowSpec".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// The inline steps, empty when the run references a named workflow
    pub fn steps(&self) -> &[WorkflowStep] {
        self.spec
            .workflow_spec
            .as_ref()
            .map(|s| s.steps.as_slice())
            .unwrap_or_default()
    }

    /// The effective execution mode, defaulting DAG/DAG
    pub fn execute_mode(&self) -> WorkflowExecuteMode {
        self.spec.mode.clone().unwrap_or_default()
    }

    /// Whether the run has finished
    pub fn is_finished(&self) -> bool {
        self.status.as_ref().map(|s| s.finished).unwrap_or(false)
    }

    /// Status, initializing an empty one when absent
    pub fn status_mut(&mut self) -> &mut WorkflowRunStatus {
        self.status.get_or_insert_with(WorkflowRunStatus::default)
    }

    /// Key identifying this run within a cluster-wide map
    pub fn object_key(&self) -> String {
        self.metadata.object_key()
    }
}

/// WorkflowRun specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunSpec {
    /// Reference to a named workflow template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<String>,

    /// Inline workflow definition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_spec: Option<WorkflowSpec>,

    /// Execution mode for steps and substeps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<WorkflowExecuteMode>,

    /// User-provided initial key/value data, injected under `context`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

/// Inline workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Ordered step list
    pub steps: Vec<WorkflowStep>,
}

/// Execution ordering for a level of the step tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkflowMode {
    /// Follow data and explicit dependencies
    #[default]
    #[serde(rename = "DAG")]
    Dag,
    /// Follow textual order
    #[serde(rename = "StepByStep")]
    StepByStep,
}

/// Execution modes for top-level steps and substeps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecuteMode {
    /// Mode for top-level steps
    #[serde(default)]
    pub steps: WorkflowMode,

    /// Mode for substeps within a group
    #[serde(default)]
    pub sub_steps: WorkflowMode,
}

impl WorkflowExecuteMode {
    /// StepByStep at both levels
    pub fn step_by_step() -> Self {
        Self {
            steps: WorkflowMode::StepByStep,
            sub_steps: WorkflowMode::StepByStep,
        }
    }
}

/// Observable state of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunStatus {
    /// Whether the run is suspended
    #[serde(default)]
    pub suspend: bool,

    /// Whether the run has been irrevocably cancelled
    #[serde(default)]
    pub terminated: bool,

    /// Whether every top-level step is terminal
    #[serde(default)]
    pub finished: bool,

    /// Mode the run is executing under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<WorkflowExecuteMode>,

    /// Human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Time the first tick started executing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Time the run finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Reference to the durable context object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_backend: Option<ObjectReference>,

    /// Per-step records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<WorkflowStepStatus>,
}

impl WorkflowRunStatus {
    /// Find a top-level step status by name
    pub fn step(&self, name: &str) -> Option<&WorkflowStepStatus> {
        self.steps.iter().find(|s| s.status.name == name)
    }

    /// Find a top-level step status by name, mutably
    pub fn step_mut(&mut self, name: &str) -> Option<&mut WorkflowStepStatus> {
        self.steps.iter_mut().find(|s| s.status.name == name)
    }

    /// Whether any step (or substep) settled in a permanent failure
    pub fn any_failed(&self) -> bool {
        self.steps.iter().any(|s| {
            s.status.phase == StepPhase::Failed
                || s.sub_steps_status
                    .iter()
                    .any(|sub| sub.phase == StepPhase::Failed)
        })
    }
}
