//! WorkflowRun resource types
//!
//! This crate provides the declarative resource types consumed by the
//! workflow engine: the `WorkflowRun` pipeline description, per-step
//! specs and statuses, and the ConfigMap object backing the durable
//! workflow context.
//!
//! # API Group
//!
//! All types use the `core.oam.dev/v1alpha1` API group and keep wire
//! compatibility with the upstream WorkflowRun resource so existing
//! manifests round-trip unchanged.

pub mod configmap;
pub mod error;
pub mod metadata;
pub mod step;
pub mod workflowrun;

pub use configmap::*;
pub use error::*;
pub use metadata::*;
pub use step::*;
pub use workflowrun::*;

/// API version for the WorkflowRun resource
pub const API_VERSION: &str = "core.oam.dev/v1alpha1";

/// API group for the WorkflowRun resource
pub const API_GROUP: &str = "core.oam.dev";

/// Version string
pub const VERSION: &str = "v1alpha1";

/// Kind of the run resource
pub const WORKFLOW_RUN_KIND: &str = "WorkflowRun";

/// Step type reserved for nested step groups
pub const STEP_TYPE_STEP_GROUP: &str = "step-group";

/// Step type reserved for suspension points
pub const STEP_TYPE_SUSPEND: &str = "suspend";
