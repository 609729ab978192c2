//! End-to-end reconcile scenarios
//!
//! These tests drive the whole stack the way the enclosing controller
//! would: load or create the run context, generate task runners, execute
//! one tick, persist the status, and interleave operator actions.

use async_trait::async_trait;
use oamflow_api::{
    OwnerReference, StepOutput, StepPhase, StepReason, WorkflowExecuteMode, WorkflowRun,
    WorkflowStep, ANNOTATION_START_TIMESTAMP, CONFIG_MAP_KEY_VARS,
};
use oamflow_context::{
    cleanup_memory_store, load_context, new_context, ConfigMapStore, InMemoryConfigStore,
    WorkflowContext,
};
use oamflow_engine::{
    generate, EngineConfig, MemoryRunStore, RunOperator, RunStore, StepGeneratorOptions,
    TickResult, WorkflowExecutor,
};
use oamflow_providers::{
    NoopProvider, Provider, ProviderContext, ProviderOutcome, Providers,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Succeeds, counts dispatches per step, and publishes a fixed result
struct CountingProvider {
    name: String,
    calls: Arc<StdMutex<HashMap<String, usize>>>,
}

#[async_trait]
impl Provider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &ProviderContext) -> oamflow_providers::Result<ProviderOutcome> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(ctx.step_name.clone())
            .or_insert(0) += 1;
        Ok(ProviderOutcome::done().with_result(json!({"output": ctx.step_name.clone()})))
    }
}

/// Fails while the switch is on, succeeds after it is flipped off
struct SwitchedProvider {
    name: String,
    failing: Arc<AtomicBool>,
    calls: Arc<StdMutex<HashMap<String, usize>>>,
}

#[async_trait]
impl Provider for SwitchedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &ProviderContext) -> oamflow_providers::Result<ProviderOutcome> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(ctx.step_name.clone())
            .or_insert(0) += 1;
        if self.failing.load(Ordering::SeqCst) {
            Ok(ProviderOutcome::failed("switched off"))
        } else {
            Ok(ProviderOutcome::done().with_result(json!({"output": "recovered"})))
        }
    }
}

/// Always reports Wait, pinning the step in Running
struct WaitingProvider;

#[async_trait]
impl Provider for WaitingProvider {
    fn name(&self) -> &str {
        "external-wait"
    }

    async fn handle(&self, _ctx: &ProviderContext) -> oamflow_providers::Result<ProviderOutcome> {
        Ok(ProviderOutcome::wait("waiting on external progress"))
    }
}

struct Cluster {
    run_store: Arc<MemoryRunStore>,
    cm_store: Arc<InMemoryConfigStore>,
    providers: Arc<Providers>,
    executor: WorkflowExecutor,
}

impl Cluster {
    async fn new(run: WorkflowRun, providers: Providers, config: EngineConfig) -> Self {
        let run_store = Arc::new(MemoryRunStore::new());
        run_store.put(&run).await.unwrap();
        Self {
            run_store,
            cm_store: Arc::new(InMemoryConfigStore::new()),
            providers: Arc::new(providers),
            executor: WorkflowExecutor::new(config),
        }
    }

    fn operator(&self) -> RunOperator {
        RunOperator::new(self.run_store.clone(), self.cm_store.clone())
    }

    /// One controller reconcile: context, generation, tick, persistence
    async fn reconcile(&self, namespace: &str, name: &str) -> TickResult {
        let mut run = self
            .run_store
            .get(namespace, name)
            .await
            .unwrap()
            .unwrap();
        let owners = vec![OwnerReference::controller(
            &run.metadata.name,
            run.metadata.uid,
        )];
        let ctx: WorkflowContext = match run
            .status
            .as_ref()
            .and_then(|s| s.context_backend.as_ref())
        {
            Some(backend) => load_context(
                self.cm_store.clone(),
                namespace,
                &run.metadata.name,
                &backend.name,
            )
            .await
            .unwrap(),
            None => new_context(self.cm_store.clone(), namespace, &run.metadata.name, owners)
                .await
                .unwrap(),
        };
        let tasks = generate(
            &run,
            &StepGeneratorOptions {
                providers: self.providers.clone(),
            },
        )
        .unwrap();
        let wf_ctx = Arc::new(Mutex::new(ctx));
        let tick = self
            .executor
            .execute_tick(&mut run, &wf_ctx, &tasks)
            .await
            .unwrap();
        self.run_store.update_status(&run).await.unwrap();
        tick
    }

    async fn run(&self, namespace: &str, name: &str) -> WorkflowRun {
        self.run_store.get(namespace, name).await.unwrap().unwrap()
    }
}

fn phase(run: &WorkflowRun, step: &str) -> StepPhase {
    run.status.as_ref().unwrap().step(step).unwrap().status.phase
}

#[tokio::test]
async fn suspend_resume_lifecycle() {
    let run = WorkflowRun::new(
        "lifecycle",
        vec![
            WorkflowStep::new("notify", "count"),
            WorkflowStep::new("pause", "suspend"),
            WorkflowStep::new("apply", "count"),
        ],
    )
    .with_mode(WorkflowExecuteMode::step_by_step());

    let calls = Arc::new(StdMutex::new(HashMap::new()));
    let mut providers = Providers::with_builtins();
    providers.register(CountingProvider {
        name: "count".to_string(),
        calls: calls.clone(),
    });
    let cluster = Cluster::new(run, providers, EngineConfig::default()).await;

    cluster.reconcile("default", "lifecycle").await;
    let tick = cluster.reconcile("default", "lifecycle").await;
    assert!(tick.suspended);

    let run = cluster.run("default", "lifecycle").await;
    assert_eq!(phase(&run, "notify"), StepPhase::Succeeded);
    assert_eq!(phase(&run, "pause"), StepPhase::Suspending);
    assert_eq!(phase(&run, "apply"), StepPhase::Pending);
    assert!(run.status.as_ref().unwrap().suspend);

    // suspended runs do not move on their own
    let tick = cluster.reconcile("default", "lifecycle").await;
    assert!(tick.suspended);
    assert_eq!(
        phase(&cluster.run("default", "lifecycle").await, "apply"),
        StepPhase::Pending
    );

    cluster.operator().resume("default", "lifecycle").await.unwrap();
    let run = cluster.run("default", "lifecycle").await;
    assert_eq!(phase(&run, "pause"), StepPhase::Succeeded);
    assert!(!run.status.as_ref().unwrap().suspend);

    let tick = cluster.reconcile("default", "lifecycle").await;
    assert!(tick.finished);
    let run = cluster.run("default", "lifecycle").await;
    let status = run.status.as_ref().unwrap();
    assert!(status.finished);
    assert!(status.end_time.is_some());
    assert_eq!(status.message.as_deref(), Some("workflow succeeded"));

    // the context object exists, owned naming and stamped
    let backend = status.context_backend.as_ref().unwrap();
    assert_eq!(backend.name, "workflow-lifecycle-context");
    let cm = cluster
        .cm_store
        .get("default", &backend.name)
        .await
        .unwrap()
        .unwrap();
    assert!(cm
        .metadata
        .annotations
        .contains_key(ANNOTATION_START_TIMESTAMP));

    cleanup_memory_store("lifecycle", "default");
}

#[tokio::test]
async fn restart_from_failed_step_replays_only_downstream() {
    let mut a = WorkflowStep::new("a", "count");
    a.outputs = vec![StepOutput {
        name: "out-a".to_string(),
        value_from: "output".to_string(),
    }];
    let mut b = WorkflowStep::new("b", "switched");
    b.outputs = vec![StepOutput {
        name: "out-b".to_string(),
        value_from: "output".to_string(),
    }];
    let run = WorkflowRun::new("replay", vec![a, b, WorkflowStep::new("c", "count")])
        .with_mode(WorkflowExecuteMode::step_by_step());

    let calls = Arc::new(StdMutex::new(HashMap::new()));
    let failing = Arc::new(AtomicBool::new(true));
    let mut providers = Providers::new();
    providers.register(CountingProvider {
        name: "count".to_string(),
        calls: calls.clone(),
    });
    providers.register(SwitchedProvider {
        name: "switched".to_string(),
        failing: failing.clone(),
        calls: calls.clone(),
    });
    let config = EngineConfig {
        error_retry_times: 2,
        ..Default::default()
    };
    let cluster = Cluster::new(run, providers, config).await;

    // a succeeds, then b burns through its retry budget
    cluster.reconcile("default", "replay").await;
    cluster.reconcile("default", "replay").await;
    let tick = cluster.reconcile("default", "replay").await;
    assert!(tick.finished);
    let run = cluster.run("default", "replay").await;
    assert_eq!(phase(&run, "b"), StepPhase::Failed);
    assert_eq!(
        run.status.as_ref().unwrap().step("b").unwrap().status.reason,
        Some(StepReason::FailedAfterRetries)
    );
    assert_eq!(run.status.as_ref().unwrap().message.as_deref(), Some("workflow failed"));

    // fix the external condition and restart from b
    failing.store(false, Ordering::SeqCst);
    cluster.operator().restart("default", "replay", "b").await.unwrap();

    let run = cluster.run("default", "replay").await;
    let status = run.status.as_ref().unwrap();
    assert!(status.step("a").is_some());
    assert!(status.step("b").is_none());
    assert!(status.step("c").is_none());
    assert!(!status.finished);

    // upstream output survives the restart
    let backend = status.context_backend.as_ref().unwrap().name.clone();
    let cm = cluster.cm_store.get("default", &backend).await.unwrap().unwrap();
    let vars: serde_json::Value =
        serde_json::from_str(cm.get(CONFIG_MAP_KEY_VARS).unwrap()).unwrap();
    assert_eq!(vars["out-a"], json!("a"));
    assert!(vars.get("out-b").is_none());

    cluster.reconcile("default", "replay").await;
    let tick = cluster.reconcile("default", "replay").await;
    assert!(tick.finished);
    let run = cluster.run("default", "replay").await;
    assert_eq!(phase(&run, "b"), StepPhase::Succeeded);
    assert_eq!(phase(&run, "c"), StepPhase::Succeeded);
    assert_eq!(
        run.status.as_ref().unwrap().message.as_deref(),
        Some("workflow succeeded")
    );

    // completed work upstream of the restart ran exactly once
    assert_eq!(calls.lock().unwrap().get("a"), Some(&1));
    assert_eq!(calls.lock().unwrap().get("c"), Some(&1));

    cleanup_memory_store("replay", "default");
}

#[tokio::test]
async fn terminate_settles_running_step_and_blocks_transitions() {
    let run = WorkflowRun::new(
        "term-midrun",
        vec![
            WorkflowStep::new("long", "external-wait"),
            WorkflowStep::new("later", "noop"),
        ],
    )
    .with_mode(WorkflowExecuteMode::step_by_step());
    let mut providers = Providers::new();
    providers.register(WaitingProvider);
    providers.register(NoopProvider::new("noop"));
    let cluster = Cluster::new(run, providers, EngineConfig::default()).await;

    cluster.reconcile("default", "term-midrun").await;
    let run = cluster.run("default", "term-midrun").await;
    assert_eq!(phase(&run, "long"), StepPhase::Running);
    assert_eq!(phase(&run, "later"), StepPhase::Pending);

    cluster
        .operator()
        .terminate("default", "term-midrun")
        .await
        .unwrap();
    let run = cluster.run("default", "term-midrun").await;
    let status = run.status.as_ref().unwrap();
    assert!(status.terminated);
    assert!(!status.suspend);
    assert_eq!(phase(&run, "long"), StepPhase::Failed);
    assert_eq!(
        status.step("long").unwrap().status.reason,
        Some(StepReason::Terminate)
    );
    assert_eq!(phase(&run, "later"), StepPhase::Pending);

    // no reconcile after termination moves any step into Running
    let tick = cluster.reconcile("default", "term-midrun").await;
    assert!(tick.terminated);
    let run = cluster.run("default", "term-midrun").await;
    assert_eq!(phase(&run, "long"), StepPhase::Failed);
    assert_eq!(phase(&run, "later"), StepPhase::Pending);
    assert!(run.status.as_ref().unwrap().finished);

    cleanup_memory_store("term-midrun", "default");
}
