//! Provider trait and dispatch types

use crate::error::Result;
use async_trait::async_trait;
use oamflow_context::WorkflowContext;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Context handed to a provider for one step dispatch
#[derive(Clone)]
pub struct ProviderContext {
    /// Run name
    pub run_name: String,

    /// Run namespace
    pub namespace: String,

    /// Name of the step being executed
    pub step_name: String,

    /// Stable ID of the step being executed
    pub step_id: String,

    /// The step's properties with bound inputs merged in
    pub properties: Value,

    /// Shared per-run context
    pub context: Arc<Mutex<WorkflowContext>>,

    /// Deadline the handler must respect; the scheduler also enforces it
    pub deadline: Option<Duration>,
}

impl ProviderContext {
    /// Read a property by key
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_object().and_then(|m| m.get(key))
    }

    /// Read a string property by key
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("run_name", &self.run_name)
            .field("step_name", &self.step_name)
            .field("step_id", &self.step_id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Phase decision returned by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDecision {
    /// Step completed successfully
    Done,
    /// Step failed; the scheduler decides whether retries remain
    Failed,
    /// Step is waiting on external progress; stay Running
    Wait,
    /// Step suspends the run
    Suspend,
}

/// Outcome of one provider dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    /// Phase decision
    pub decision: PhaseDecision,

    /// Human-readable detail
    pub message: Option<String>,

    /// Result document; declared step outputs select from it via
    /// their `valueFrom` paths
    pub result: Value,
}

impl ProviderOutcome {
    /// Successful outcome with an empty result document
    pub fn done() -> Self {
        Self {
            decision: PhaseDecision::Done,
            message: None,
            result: json!({}),
        }
    }

    /// Failed outcome with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            decision: PhaseDecision::Failed,
            message: Some(message.into()),
            result: json!({}),
        }
    }

    /// Waiting outcome with a message
    pub fn wait(message: impl Into<String>) -> Self {
        Self {
            decision: PhaseDecision::Wait,
            message: Some(message.into()),
            result: json!({}),
        }
    }

    /// Suspending outcome
    pub fn suspend() -> Self {
        Self {
            decision: PhaseDecision::Suspend,
            message: None,
            result: json!({}),
        }
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replace the result document
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }
}

/// Pluggable handler for one step type
#[async_trait]
pub trait Provider: Send + Sync {
    /// The step type this provider handles
    fn name(&self) -> &str;

    /// Execute one dispatch of a step
    async fn handle(&self, ctx: &ProviderContext) -> Result<ProviderOutcome>;
}

/// A provider that always succeeds (for tests)
pub struct NoopProvider {
    name: String,
}

impl NoopProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Provider for NoopProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &ProviderContext) -> Result<ProviderOutcome> {
        Ok(ProviderOutcome::done().with_message("no-op completed"))
    }
}

/// A provider that always fails (for tests)
pub struct FailingProvider {
    name: String,
    message: String,
}

impl FailingProvider {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &ProviderContext) -> Result<ProviderOutcome> {
        Ok(ProviderOutcome::failed(self.message.clone()))
    }
}

/// A provider that sleeps for a fixed duration (for timeout tests)
pub struct SleepProvider {
    name: String,
    duration: Duration,
}

impl SleepProvider {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

#[async_trait]
impl Provider for SleepProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &ProviderContext) -> Result<ProviderOutcome> {
        tokio::time::sleep(self.duration).await;
        Ok(ProviderOutcome::done().with_message("sleep completed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oamflow_context::{new_context, InMemoryConfigStore};

    async fn test_provider_context() -> ProviderContext {
        let store = Arc::new(InMemoryConfigStore::new());
        let ctx = new_context(store, "default", "provider-test", vec![])
            .await
            .unwrap();
        ProviderContext {
            run_name: "provider-test".to_string(),
            namespace: "default".to_string(),
            step_name: "step".to_string(),
            step_id: "id12345678".to_string(),
            properties: json!({"channel": "#ops"}),
            context: Arc::new(Mutex::new(ctx)),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_property_accessors() {
        let ctx = test_provider_context().await;
        assert_eq!(ctx.property_str("channel"), Some("#ops"));
        assert!(ctx.property("missing").is_none());
        oamflow_context::cleanup_memory_store("provider-test", "default");
    }

    #[tokio::test]
    async fn test_noop_provider() {
        let ctx = test_provider_context().await;
        let outcome = NoopProvider::new("noop").handle(&ctx).await.unwrap();
        assert_eq!(outcome.decision, PhaseDecision::Done);
        oamflow_context::cleanup_memory_store("provider-test", "default");
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let ctx = test_provider_context().await;
        let outcome = FailingProvider::new("fail", "boom").handle(&ctx).await.unwrap();
        assert_eq!(outcome.decision, PhaseDecision::Failed);
        assert_eq!(outcome.message.as_deref(), Some("boom"));
        oamflow_context::cleanup_memory_store("provider-test", "default");
    }

    #[test]
    fn test_outcome_builders() {
        let outcome = ProviderOutcome::done()
            .with_message("ok")
            .with_result(json!({"url": "http://example.com"}));
        assert_eq!(outcome.decision, PhaseDecision::Done);
        assert_eq!(outcome.result["url"], json!("http://example.com"));

        assert_eq!(ProviderOutcome::suspend().decision, PhaseDecision::Suspend);
        assert_eq!(
            ProviderOutcome::wait("pending").decision,
            PhaseDecision::Wait
        );
    }
}
