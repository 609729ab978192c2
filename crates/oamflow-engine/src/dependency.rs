//! Downstream-dependent resolution
//!
//! Used by partial restart to find every step that must be replayed
//! when a failed step is reset. In sequential mode dependents are simply
//! the steps declared after the target; in DAG mode they are the
//! transitive consumers of the target, following explicit `dependsOn`
//! edges and input/output data edges.

use oamflow_api::WorkflowStep;
use std::collections::{HashMap, HashSet};

/// Names of the steps downstream of `step_name`.
///
/// Substeps participate: a substep target yields the substeps after it
/// (sequential) or its transitive consumers (DAG), and substep outputs
/// create edges like any other.
pub fn get_step_dependency(steps: &[WorkflowStep], step_name: &str, dag: bool) -> Vec<String> {
    if !dag {
        return sequential_dependents(steps, step_name);
    }
    let depends_on = build_depends_on(steps);
    find_dependency(step_name, &depends_on)
}

fn sequential_dependents(steps: &[WorkflowStep], step_name: &str) -> Vec<String> {
    for (i, step) in steps.iter().enumerate() {
        if step.name == step_name {
            return steps[i + 1..].iter().map(|s| s.name.clone()).collect();
        }
        for (j, sub) in step.sub_steps.iter().enumerate() {
            if sub.name == step_name {
                return step.sub_steps[j + 1..]
                    .iter()
                    .map(|s| s.name.clone())
                    .collect();
            }
        }
    }
    Vec::new()
}

/// Build the full dependency map: explicit `dependsOn` plus the
/// producer of every consumed input, matched by output name.
fn build_depends_on(steps: &[WorkflowStep]) -> HashMap<String, Vec<String>> {
    let mut step_outputs: HashMap<&str, &str> = HashMap::new();
    let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();

    for step in steps {
        for output in &step.outputs {
            step_outputs.insert(&output.name, &step.name);
        }
        depends_on.insert(step.name.clone(), step.depends_on.clone());
        for sub in &step.sub_steps {
            for output in &sub.outputs {
                step_outputs.insert(&output.name, &sub.name);
            }
            depends_on.insert(sub.name.clone(), sub.depends_on.clone());
        }
    }

    let mut add_input_edges = |name: &str, inputs: &[oamflow_api::StepInput]| {
        for input in inputs {
            if let Some(producer) = step_outputs.get(input.from.as_str()) {
                let deps = depends_on.entry(name.to_string()).or_default();
                if !deps.iter().any(|d| d == producer) {
                    deps.push((*producer).to_string());
                }
            }
        }
    };
    for step in steps {
        add_input_edges(&step.name, &step.inputs);
        for sub in &step.sub_steps {
            add_input_edges(&sub.name, &sub.inputs);
        }
    }

    depends_on
}

/// Transitive set of steps that (directly or indirectly) depend on
/// `step_name`. A visited set keeps the result duplicate-free and the
/// traversal linear on deep graphs.
fn find_dependency(step_name: &str, depends_on: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = vec![step_name];
    let mut dependents = Vec::new();

    while let Some(current) = queue.pop() {
        for (step, deps) in depends_on {
            if deps.iter().any(|d| d == current) && visited.insert(step) {
                dependents.push(step.clone());
                queue.push(step);
            }
        }
    }
    dependents.sort();
    dependents
}
