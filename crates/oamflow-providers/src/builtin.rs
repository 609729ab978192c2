//! Built-in providers
//!
//! These handlers cover the step types the engine itself guarantees:
//! suspension points, component application into the shared context, and
//! operator-facing notifications. Cluster- and network-backed providers
//! (HTTP requests, email) are installed by the embedding controller.

use crate::error::Result;
use crate::provider::{Provider, ProviderContext, ProviderOutcome};
use crate::registry::Providers;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

/// Install the built-in providers into a registry
pub fn install(providers: &mut Providers) {
    providers.register(SuspendProvider);
    providers.register(ApplyComponentProvider);
    providers.register(NotifyProvider);
}

/// Pauses the run until an operator resumes it, or until the optional
/// `duration` property elapses.
pub struct SuspendProvider;

#[async_trait]
impl Provider for SuspendProvider {
    fn name(&self) -> &str {
        "suspend"
    }

    async fn handle(&self, ctx: &ProviderContext) -> Result<ProviderOutcome> {
        let outcome = match ctx.property_str("duration") {
            Some(duration) => ProviderOutcome::suspend()
                .with_message(format!("suspended for {duration}")),
            None => ProviderOutcome::suspend().with_message("suspended, waiting for resume"),
        };
        info!(
            run = %ctx.run_name,
            step = %ctx.step_name,
            "workflow suspending"
        );
        Ok(outcome)
    }
}

/// Unifies a patch into a named component manifest in the run context
/// and publishes the merged workload as the step result.
pub struct ApplyComponentProvider;

#[async_trait]
impl Provider for ApplyComponentProvider {
    fn name(&self) -> &str {
        "apply-component"
    }

    async fn handle(&self, ctx: &ProviderContext) -> Result<ProviderOutcome> {
        let Some(component) = ctx.property_str("component") else {
            return Ok(ProviderOutcome::failed(
                "apply-component requires a component property",
            ));
        };
        let component = component.to_string();
        let patch = ctx.property("patch").cloned();

        let mut wf_ctx = ctx.context.lock().await;
        if let Some(patch) = &patch {
            if let Err(err) = wf_ctx.patch_component(&component, patch) {
                return Ok(ProviderOutcome::failed(err.to_string()));
            }
        }
        let workload = match wf_ctx.get_component(&component) {
            Ok(manifest) => manifest.workload.clone(),
            Err(err) => return Ok(ProviderOutcome::failed(err.to_string())),
        };
        info!(
            run = %ctx.run_name,
            step = %ctx.step_name,
            component = %component,
            "applied component"
        );
        Ok(ProviderOutcome::done()
            .with_message(format!("applied component {component}"))
            .with_result(json!({ "output": workload })))
    }
}

/// Emits an operator-facing notification line through the log stream.
pub struct NotifyProvider;

#[async_trait]
impl Provider for NotifyProvider {
    fn name(&self) -> &str {
        "notify"
    }

    async fn handle(&self, ctx: &ProviderContext) -> Result<ProviderOutcome> {
        let message = ctx.property_str("message").unwrap_or("").to_string();
        match ctx.property_str("level") {
            Some("warn") => warn!(run = %ctx.run_name, step = %ctx.step_name, "{message}"),
            _ => info!(run = %ctx.run_name, step = %ctx.step_name, "{message}"),
        }
        Ok(ProviderOutcome::done()
            .with_message("notification sent")
            .with_result(json!({ "output": { "message": message } })))
    }
}
