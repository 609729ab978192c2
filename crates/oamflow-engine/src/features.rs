//! Feature gates
//!
//! Alpha behaviors toggled per process. Gates are plain data injected
//! into the executor so tests can flip them without global state.

/// Feature gates recognized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureGates {
    /// Suspend the run on the first step failure so an operator can
    /// inspect it before retries continue. Alpha, off by default.
    pub enable_suspend_on_failure: bool,

    /// Export a record of each finished run through the configured
    /// exporter. Alpha, on by default.
    pub enable_persist_workflow_record: bool,
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self {
            enable_suspend_on_failure: false,
            enable_persist_workflow_record: true,
        }
    }
}
