//! Workflow step spec and status types

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One node in the pipeline graph.
///
/// `properties` is opaque to the engine and interpreted by the provider
/// named in `step_type`. `sub_steps` is only meaningful for steps of type
/// `step-group`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Step name, unique within its parent scope
    pub name: String,

    /// Step type, keying the provider registry
    #[serde(rename = "type")]
    pub step_type: String,

    /// Conditional gate; when it evaluates false the step is skipped
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_cond: Option<String>,

    /// Per-step deadline, e.g. "30s" or "5m"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Names of steps that must reach a terminal phase first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Values read from upstream outputs and bound into properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<StepInput>,

    /// Values published for downstream steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<StepOutput>,

    /// Opaque per-type configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,

    /// Child steps, for `step-group` only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<WorkflowStep>,
}

impl WorkflowStep {
    /// Create a step with a name and type
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            ..Default::default()
        }
    }

    /// Whether this step is a nested step group
    pub fn is_group(&self) -> bool {
        self.step_type == crate::STEP_TYPE_STEP_GROUP
    }

    /// Parse the `timeout` field into a duration.
    ///
    /// Accepts plain seconds ("30"), or a value with an `s`/`m`/`h`
    /// suffix. Returns `None` when no timeout is set.
    pub fn parse_timeout(&self) -> Result<Option<Duration>> {
        let Some(raw) = self.timeout.as_deref() else {
            return Ok(None);
        };
        parse_duration(raw)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidFieldValue {
                field: "timeout".to_string(),
                message: format!("unrecognized duration {raw:?}"),
            })
    }
}

/// Parse a duration string: plain seconds ("30") or a value with an
/// `s`/`m`/`h` suffix
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value.parse().ok()?;
    match unit.trim() {
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Binding from an upstream output into this step's properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    /// Name of the upstream output to read
    pub from: String,

    /// Property key the value is merged under
    pub parameter_key: String,
}

/// Value published by a step for downstream consumption
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    /// Output name; downstream inputs reference it via `from`
    pub name: String,

    /// Expression selecting the value from the step's result
    pub value_from: String,
}

/// Phase of a step across reconciles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    /// Not yet dispatched
    #[default]
    Pending,
    /// Dispatched, awaiting a terminal outcome
    Running,
    /// Terminal: completed successfully
    Succeeded,
    /// Terminal unless retries remain
    Failed,
    /// Terminal: gate evaluated false
    Skipped,
    /// Paused awaiting an external event or timer
    Suspending,
}

impl StepPhase {
    /// Whether the phase allows successors to proceed
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepPhase::Succeeded | StepPhase::Skipped)
    }

    /// Whether the phase will never change without an operator action
    /// or a retry
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepPhase::Succeeded | StepPhase::Skipped | StepPhase::Failed
        )
    }
}

/// Why a step is in its current phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepReason {
    /// Step exceeded its deadline
    Timeout,
    /// Retry budget exhausted
    FailedAfterRetries,
    /// Run was terminated while the step was in flight
    Terminate,
    /// Step configuration could not be evaluated (bad `if` expression
    /// or timeout value)
    Action,
    /// Gate evaluated false
    Skip,
    /// Step is suspended
    Suspend,
    /// Step is waiting on external progress
    Wait,
    /// A referenced upstream output was missing
    InputLookupFailed,
    /// Provider reported a (possibly retryable) failure
    Execute,
}

/// Per-step record kept in the run status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// Opaque identifier, stable across restarts
    pub id: String,

    /// Step name
    pub name: String,

    /// Step type
    #[serde(rename = "type")]
    pub step_type: String,

    /// Current phase
    pub phase: StepPhase,

    /// Why the step is in this phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StepReason>,

    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// First time the step was dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_execute_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Most recent time the step was dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execute_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl StepStatus {
    /// Create a pending status for a step
    pub fn pending(id: impl Into<String>, step: &WorkflowStep) -> Self {
        Self {
            id: id.into(),
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            phase: StepPhase::Pending,
            ..Default::default()
        }
    }

    /// Record a dispatch, stamping execute times
    pub fn mark_executed(&mut self) {
        let now = chrono::Utc::now();
        if self.first_execute_time.is_none() {
            self.first_execute_time = Some(now);
        }
        self.last_execute_time = Some(now);
    }
}

/// Status of a top-level step, including substep statuses for groups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepStatus {
    /// The step's own record
    #[serde(flatten)]
    pub status: StepStatus,

    /// Substep records, for `step-group` steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps_status: Vec<StepStatus>,
}

impl WorkflowStepStatus {
    /// Find a substep status by name
    pub fn sub_step(&self, name: &str) -> Option<&StepStatus> {
        self.sub_steps_status.iter().find(|s| s.name == name)
    }
}
