//! Task runners
//!
//! A task runner is the executable form of one declarative step: the
//! step spec, its stable ID, and either the provider that performs the
//! work or, for step groups, the recursively generated sub-runners.

use oamflow_api::{WorkflowMode, WorkflowStep};
use oamflow_providers::Provider;
use std::sync::Arc;

/// What a task runner executes
pub enum TaskKind {
    /// A leaf step dispatched to a provider
    Step(Arc<dyn Provider>),

    /// A nested group of sub-runners
    Group {
        /// Runners for the group's substeps
        sub_tasks: Vec<TaskRunner>,

        /// Execution mode applied to the substeps
        mode: WorkflowMode,
    },
}

/// Executable form of one workflow step
pub struct TaskRunner {
    /// The declarative step
    pub step: WorkflowStep,

    /// Stable step ID, reused from prior status when present
    pub id: String,

    /// Leaf or group behavior
    pub kind: TaskKind,
}

impl TaskRunner {
    /// The step name
    pub fn name(&self) -> &str {
        &self.step.name
    }

    /// Whether this runner is a step group
    pub fn is_group(&self) -> bool {
        matches!(self.kind, TaskKind::Group { .. })
    }

    /// The group's sub-runners, empty for leaf steps
    pub fn sub_tasks(&self) -> &[TaskRunner] {
        match &self.kind {
            TaskKind::Group { sub_tasks, .. } => sub_tasks,
            TaskKind::Step(_) => &[],
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("TaskRunner");
        dbg.field("name", &self.step.name)
            .field("type", &self.step.step_type)
            .field("id", &self.id);
        if let TaskKind::Group { sub_tasks, mode } = &self.kind {
            dbg.field("mode", mode)
                .field("sub_tasks", &sub_tasks.iter().map(|t| t.name()).collect::<Vec<_>>());
        }
        dbg.finish()
    }
}
