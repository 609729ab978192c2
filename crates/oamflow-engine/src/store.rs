//! Run state storage
//!
//! Abstracts the cluster round-trips for the run object itself. Status
//! writes use resource-version compare-and-swap; callers wrap them in a
//! [`ConflictBackoff`] loop.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use oamflow_api::WorkflowRun;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Trait for persisting workflow runs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Get a run by namespace and name
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<WorkflowRun>>;

    /// Save a run (spec and status), assigning a fresh resource version
    async fn put(&self, run: &WorkflowRun) -> Result<WorkflowRun>;

    /// Replace a run's status, failing with [`EngineError::Conflict`]
    /// when the run's resource version is stale
    async fn update_status(&self, run: &WorkflowRun) -> Result<WorkflowRun>;
}

/// In-memory run store for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, WorkflowRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_version(run: &mut WorkflowRun) {
        let next = run
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        run.metadata.resource_version = Some(next.to_string());
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<WorkflowRun>> {
        let key = format!("{namespace}/{name}");
        Ok(self.runs.read().unwrap().get(&key).cloned())
    }

    async fn put(&self, run: &WorkflowRun) -> Result<WorkflowRun> {
        let mut stored = run.clone();
        Self::bump_version(&mut stored);
        self.runs
            .write()
            .unwrap()
            .insert(stored.object_key(), stored.clone());
        Ok(stored)
    }

    async fn update_status(&self, run: &WorkflowRun) -> Result<WorkflowRun> {
        let key = run.object_key();
        let mut runs = self.runs.write().unwrap();
        match runs.get(&key) {
            Some(existing)
                if existing.metadata.resource_version != run.metadata.resource_version =>
            {
                Err(EngineError::Conflict(key))
            }
            Some(existing) => {
                let mut stored = existing.clone();
                stored.status = run.status.clone();
                Self::bump_version(&mut stored);
                runs.insert(key, stored.clone());
                Ok(stored)
            }
            None => Err(EngineError::RunNotFound(key)),
        }
    }
}

/// Bounded exponential backoff for optimistic-concurrency retries.
///
/// Matches the client-side default: five attempts starting at 10ms,
/// doubling each time.
#[derive(Debug)]
pub struct ConflictBackoff {
    attempt: u32,
    max_attempts: u32,
    base: Duration,
}

impl Default for ConflictBackoff {
    fn default() -> Self {
        Self {
            attempt: 0,
            max_attempts: 5,
            base: Duration::from_millis(10),
        }
    }
}

impl ConflictBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for the next backoff window. Returns false once the retry
    /// budget is exhausted.
    pub async fn wait(&mut self) -> bool {
        if self.attempt >= self.max_attempts {
            return false;
        }
        let delay = self.base * 2u32.pow(self.attempt);
        self.attempt += 1;
        tokio::time::sleep(delay).await;
        true
    }
}
