//! Conditional-gate evaluation
//!
//! Step `if` predicates are compiled expressions evaluated against a
//! scope document exposing `context` (user-provided run data), `inputs`
//! (the step's bound input values), and `status` (phase and reason of
//! every step seen so far). Step names containing dashes are addressed
//! with index syntax: `status["build-image"].phase == "succeeded"`.

use crate::error::{EngineError, Result};
use minijinja::Environment;
use serde_json::Value;

/// The `if` keyword that always passes, regardless of upstream phases
pub const IF_ALWAYS: &str = "always";

/// Evaluate a step's `if` expression against the scope document
pub fn evaluate_if(step_name: &str, expr: &str, scope: &Value) -> Result<bool> {
    let expr = expr.trim();
    if expr.is_empty() || expr == IF_ALWAYS {
        return Ok(true);
    }
    let env = Environment::new();
    let compiled = env
        .compile_expression(expr)
        .map_err(|source| EngineError::InvalidCondition {
            step: step_name.to_string(),
            source,
        })?;
    let outcome = compiled
        .eval(scope)
        .map_err(|source| EngineError::InvalidCondition {
            step: step_name.to_string(),
            source,
        })?;
    Ok(outcome.is_true())
}
