//! The per-run workflow context
//!
//! A context aggregates the component manifests rendered for the run, a
//! structured `vars` document for cross-step data transport, a durable
//! string scratch area, and the run's ephemeral memory store. Mutations
//! mark the context dirty; [`WorkflowContext::commit`] persists dirty
//! state to the backing ConfigMap and is a no-op otherwise.

use crate::error::{ContextError, Result};
use crate::memstore::{memory_store_for, MemoryStore};
use crate::store::ConfigMapStore;
use crate::util::{join_paths, random_string};
use crate::value::{make_value, unify, ValueTree};
use oamflow_api::{
    ConfigMap, ObjectMeta, ObjectReference, OwnerReference, ANNOTATION_START_TIMESTAMP,
    CONFIG_MAP_KEY_COMPONENTS, CONFIG_MAP_KEY_VARS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Resources rendered from one application component
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentManifest {
    /// The workload descriptor
    pub workload: Value,

    /// Auxiliary trait descriptors
    pub auxiliaries: Vec<Value>,
}

/// Persisted shape of a component manifest: workload and traits are kept
/// in their rendered string form.
#[derive(Debug, Serialize, Deserialize)]
struct ComponentMould {
    #[serde(rename = "StandardWorkload")]
    standard_workload: String,

    #[serde(rename = "Traits", default, skip_serializing_if = "Vec::is_empty")]
    traits: Vec<String>,
}

impl ComponentManifest {
    /// Structurally unify a patch into the workload
    pub fn patch(&mut self, patch: &Value) {
        unify(&mut self.workload, patch);
    }

    fn render(&self) -> Result<String> {
        let mould = ComponentMould {
            standard_workload: serde_json::to_string(&self.workload)?,
            traits: self
                .auxiliaries
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<_, _>>()?,
        };
        Ok(serde_json::to_string(&mould)?)
    }

    fn parse(name: &str, raw: &str) -> Result<Self> {
        let mould: ComponentMould =
            serde_json::from_str(raw).map_err(|e| ContextError::DecodeComponent {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let workload = serde_json::from_str(&mould.standard_workload).map_err(|e| {
            ContextError::DecodeComponent {
                name: name.to_string(),
                message: e.to_string(),
            }
        })?;
        let auxiliaries = mould
            .traits
            .iter()
            .map(|t| serde_json::from_str(t))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e: serde_json::Error| ContextError::DecodeComponent {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            workload,
            auxiliaries,
        })
    }
}

/// Mutable context of one workflow run
pub struct WorkflowContext {
    client: Arc<dyn ConfigMapStore>,
    store: ConfigMap,
    memory: Arc<MemoryStore>,
    components: BTreeMap<String, ComponentManifest>,
    vars: ValueTree,
    modified: bool,
}

impl WorkflowContext {
    /// Get a component manifest by name
    pub fn get_component(&self, name: &str) -> Result<&ComponentManifest> {
        self.components
            .get(name)
            .ok_or_else(|| ContextError::ComponentNotFound(name.to_string()))
    }

    /// All component manifests
    pub fn get_components(&self) -> &BTreeMap<String, ComponentManifest> {
        &self.components
    }

    /// Register a component manifest under a name
    pub fn set_component(&mut self, name: impl Into<String>, manifest: ComponentManifest) {
        self.components.insert(name.into(), manifest);
        self.modified = true;
    }

    /// Structurally unify a patch into a component's workload
    pub fn patch_component(&mut self, name: &str, patch: &Value) -> Result<()> {
        let component = self
            .components
            .get_mut(name)
            .ok_or_else(|| ContextError::ComponentNotFound(name.to_string()))?;
        component.patch(patch);
        self.modified = true;
        Ok(())
    }

    /// Get a variable from the vars tree
    pub fn get_var(&self, paths: &[&str]) -> Option<&Value> {
        self.vars.lookup(paths)
    }

    /// Set a variable in the vars tree, validating the merged document
    pub fn set_var(&mut self, value: Value, paths: &[&str]) -> Result<()> {
        self.vars.fill(value, paths)?;
        self.modified = true;
        Ok(())
    }

    /// Get durable scratch data by dotted path
    pub fn get_mutable_value(&self, paths: &[&str]) -> Option<&str> {
        self.store.get(&join_paths(paths))
    }

    /// Set durable scratch data at a dotted path
    pub fn set_mutable_value(&mut self, data: impl Into<String>, paths: &[&str]) {
        self.store.insert(join_paths(paths), data.into());
        self.modified = true;
    }

    /// Delete durable scratch data at a dotted path
    pub fn delete_mutable_value(&mut self, paths: &[&str]) {
        if self.store.remove(&join_paths(paths)) {
            self.modified = true;
        }
    }

    /// Get an ephemeral value
    pub fn get_value_in_memory(&self, paths: &[&str]) -> Option<Value> {
        self.memory.get(paths)
    }

    /// Set an ephemeral value
    pub fn set_value_in_memory(&self, value: Value, paths: &[&str]) {
        self.memory.set(value, paths);
    }

    /// Delete an ephemeral value
    pub fn delete_value_in_memory(&self, paths: &[&str]) {
        self.memory.delete(paths);
    }

    /// Increment an ephemeral counter; the first call returns 0
    pub fn increase_count_value_in_memory(&self, paths: &[&str]) -> i64 {
        self.memory.increase_count(paths)
    }

    /// Compile a string expression into a value; empty input yields an
    /// empty object
    pub fn make_parameter(&self, parameter: &str) -> Result<Value> {
        make_value(parameter)
    }

    /// The vars document
    pub fn vars(&self) -> &ValueTree {
        &self.vars
    }

    /// Reference to the backing store object
    pub fn store_ref(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(self.store.type_meta.api_version.clone()),
            kind: Some(self.store.type_meta.kind.clone()),
            name: self.store.metadata.name.clone(),
            namespace: self.store.metadata.namespace.clone(),
            uid: self.store.metadata.uid,
        }
    }

    /// Persist the context when it has been mutated since the last
    /// commit or load
    pub async fn commit(&mut self) -> Result<()> {
        if !self.modified {
            return Ok(());
        }
        self.write_to_store()?;
        let synced = match self
            .client
            .get(
                self.store.metadata.namespace_or_default(),
                &self.store.metadata.name,
            )
            .await?
        {
            Some(_) => self.client.patch(&self.store).await?,
            None => self.client.create(&self.store).await?,
        };
        self.store = synced;
        self.modified = false;
        debug!(store = %self.store.metadata.name, "committed workflow context");
        Ok(())
    }

    fn write_to_store(&mut self) -> Result<()> {
        let mut encoded = BTreeMap::new();
        for (name, component) in &self.components {
            encoded.insert(name.clone(), component.render()?);
        }
        self.store.insert(
            CONFIG_MAP_KEY_COMPONENTS,
            serde_json::to_string(&encoded)?,
        );
        self.store.insert(CONFIG_MAP_KEY_VARS, self.vars.render()?);
        Ok(())
    }

    /// Recover components and vars from a stored object
    pub fn load_from_config_map(&mut self, cm: ConfigMap) -> Result<()> {
        if let Some(raw) = cm.get(CONFIG_MAP_KEY_COMPONENTS) {
            let encoded: BTreeMap<String, String> = serde_json::from_str(raw)?;
            self.components = encoded
                .iter()
                .map(|(name, raw)| Ok((name.clone(), ComponentManifest::parse(name, raw)?)))
                .collect::<Result<_>>()?;
        }
        self.vars = ValueTree::new(cm.get(CONFIG_MAP_KEY_VARS).unwrap_or_default())?;
        self.store = cm;
        self.modified = false;
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("store", &self.store.metadata.name)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

/// The ConfigMap name carrying a run's context
pub fn generate_store_name(run_name: &str) -> String {
    format!("workflow-{run_name}-context")
}

/// Create a run's context, adopting an existing backing object when its
/// owners match.
///
/// When the stored object's owner references disagree with the current
/// run's, a fresh object is created under a suffixed name instead, so a
/// re-created run never reads a predecessor's context. The superseded
/// object is left for garbage collection via its own owners.
pub async fn new_context(
    client: Arc<dyn ConfigMapStore>,
    namespace: &str,
    run_name: &str,
    owners: Vec<OwnerReference>,
) -> Result<WorkflowContext> {
    let mut store = ConfigMap::new(
        ObjectMeta::with_namespace(generate_store_name(run_name), namespace)
            .with_owner_references(owners.clone()),
    );

    match client.get(namespace, &store.metadata.name).await? {
        None => {
            store = client.create(&store).await?;
        }
        Some(existing) if existing.metadata.owner_references == owners => {
            store = existing;
        }
        Some(existing) => {
            debug!(
                store = %existing.metadata.name,
                "owner references differ, creating a fresh context object"
            );
            store = ConfigMap::new(
                ObjectMeta::with_namespace(
                    format!("{}-{}", generate_store_name(run_name), random_string(5)),
                    namespace,
                )
                .with_owner_references(owners),
            );
            store = client.create(&store).await?;
        }
    }
    store.metadata.annotations.insert(
        ANNOTATION_START_TIMESTAMP.to_string(),
        chrono::Utc::now().to_rfc3339(),
    );

    let mut ctx = WorkflowContext {
        client,
        memory: memory_store_for(run_name, namespace),
        store,
        components: BTreeMap::new(),
        vars: ValueTree::default(),
        modified: true,
    };
    ctx.commit().await?;
    Ok(ctx)
}

/// Load a run's context from its backing object
pub async fn load_context(
    client: Arc<dyn ConfigMapStore>,
    namespace: &str,
    run_name: &str,
    store_name: &str,
) -> Result<WorkflowContext> {
    let store = client
        .get(namespace, store_name)
        .await?
        .ok_or_else(|| ContextError::StoreNotFound {
            namespace: namespace.to_string(),
            name: store_name.to_string(),
        })?;

    let mut ctx = WorkflowContext {
        client,
        memory: memory_store_for(run_name, namespace),
        store: ConfigMap::new(ObjectMeta::new(store_name)),
        components: BTreeMap::new(),
        vars: ValueTree::default(),
        modified: false,
    };
    ctx.load_from_config_map(store)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryConfigStore;
    use serde_json::json;

    fn owners(name: &str) -> Vec<OwnerReference> {
        vec![OwnerReference::controller(name, None)]
    }

    async fn fresh_context(run: &str) -> (Arc<InMemoryConfigStore>, WorkflowContext) {
        let store = Arc::new(InMemoryConfigStore::new());
        let ctx = new_context(store.clone(), "default", run, owners(run))
            .await
            .unwrap();
        (store, ctx)
    }

    #[tokio::test]
    async fn test_new_context_creates_store_object() {
        let (store, ctx) = fresh_context("ctx-create").await;

        let cm = store
            .get("default", "workflow-ctx-create-context")
            .await
            .unwrap()
            .unwrap();
        assert!(cm.metadata.annotations.contains_key(ANNOTATION_START_TIMESTAMP));
        assert_eq!(cm.get(CONFIG_MAP_KEY_VARS), Some("{}"));
        assert_eq!(ctx.store_ref().name, "workflow-ctx-create-context");
        cleanup_memory_store_for_test("ctx-create");
    }

    #[tokio::test]
    async fn test_owner_mismatch_creates_suffixed_object() {
        let store = Arc::new(InMemoryConfigStore::new());
        new_context(store.clone(), "default", "shared", owners("old-run"))
            .await
            .unwrap();

        let ctx = new_context(store.clone(), "default", "shared", owners("new-run"))
            .await
            .unwrap();

        let name = ctx.store_ref().name;
        assert!(name.starts_with("workflow-shared-context-"));
        assert_eq!(name.len(), "workflow-shared-context-".len() + 5);
        // the old object is left in place
        assert!(store
            .get("default", "workflow-shared-context")
            .await
            .unwrap()
            .is_some());
        cleanup_memory_store_for_test("shared");
    }

    #[tokio::test]
    async fn test_vars_round_trip() {
        let (store, mut ctx) = fresh_context("ctx-vars").await;

        ctx.set_var(json!({"url": "http://example.com"}), &["app-url"])
            .unwrap();
        ctx.set_var(json!(3), &["replicas"]).unwrap();
        ctx.commit().await.unwrap();

        let reloaded = load_context(
            store.clone(),
            "default",
            "ctx-vars",
            "workflow-ctx-vars-context",
        )
        .await
        .unwrap();
        assert_eq!(
            reloaded.get_var(&["app-url", "url"]),
            Some(&json!("http://example.com"))
        );
        assert_eq!(reloaded.get_var(&["replicas"]), Some(&json!(3)));
        cleanup_memory_store_for_test("ctx-vars");
    }

    #[tokio::test]
    async fn test_components_round_trip() {
        let (store, mut ctx) = fresh_context("ctx-comp").await;

        ctx.set_component(
            "web",
            ComponentManifest {
                workload: json!({"kind": "Deployment", "spec": {"replicas": 1}}),
                auxiliaries: vec![json!({"kind": "Service"})],
            },
        );
        ctx.patch_component("web", &json!({"spec": {"replicas": 2}}))
            .unwrap();
        ctx.commit().await.unwrap();

        let reloaded = load_context(
            store.clone(),
            "default",
            "ctx-comp",
            "workflow-ctx-comp-context",
        )
        .await
        .unwrap();
        let web = reloaded.get_component("web").unwrap();
        assert_eq!(web.workload["spec"]["replicas"], json!(2));
        assert_eq!(web.auxiliaries.len(), 1);
        assert!(matches!(
            reloaded.get_component("missing"),
            Err(ContextError::ComponentNotFound(_))
        ));
        cleanup_memory_store_for_test("ctx-comp");
    }

    #[tokio::test]
    async fn test_commit_is_noop_when_clean() {
        let (store, mut ctx) = fresh_context("ctx-clean").await;

        let before = store
            .get("default", "workflow-ctx-clean-context")
            .await
            .unwrap()
            .unwrap();
        ctx.commit().await.unwrap();
        let after = store
            .get("default", "workflow-ctx-clean-context")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before, after);
        cleanup_memory_store_for_test("ctx-clean");
    }

    #[tokio::test]
    async fn test_commit_load_commit_stable_bytes() {
        let (store, mut ctx) = fresh_context("ctx-stable").await;
        ctx.set_var(json!({"x": 1}), &["out"]).unwrap();
        ctx.set_mutable_value("5", &["retry", "apply"]);
        ctx.commit().await.unwrap();

        let committed = store
            .get("default", "workflow-ctx-stable-context")
            .await
            .unwrap()
            .unwrap();

        let mut reloaded = load_context(
            store.clone(),
            "default",
            "ctx-stable",
            "workflow-ctx-stable-context",
        )
        .await
        .unwrap();
        reloaded.commit().await.unwrap();

        let after = store
            .get("default", "workflow-ctx-stable-context")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(committed.data, after.data);
        assert_eq!(reloaded.get_mutable_value(&["retry", "apply"]), Some("5"));
        cleanup_memory_store_for_test("ctx-stable");
    }

    #[tokio::test]
    async fn test_mutable_values() {
        let (_store, mut ctx) = fresh_context("ctx-mutable").await;

        assert!(ctx.get_mutable_value(&["a"]).is_none());
        ctx.set_mutable_value("v1", &["a"]);
        assert_eq!(ctx.get_mutable_value(&["a"]), Some("v1"));
        ctx.delete_mutable_value(&["a"]);
        assert!(ctx.get_mutable_value(&["a"]).is_none());
        cleanup_memory_store_for_test("ctx-mutable");
    }

    #[tokio::test]
    async fn test_memory_values_and_counter() {
        let (_store, ctx) = fresh_context("ctx-memory").await;

        ctx.set_value_in_memory(json!("ephemeral"), &["flag"]);
        assert_eq!(ctx.get_value_in_memory(&["flag"]), Some(json!("ephemeral")));
        ctx.delete_value_in_memory(&["flag"]);
        assert!(ctx.get_value_in_memory(&["flag"]).is_none());

        for expected in 0..3 {
            assert_eq!(
                ctx.increase_count_value_in_memory(&["failed-times", "abc"]),
                expected
            );
        }
        cleanup_memory_store_for_test("ctx-memory");
    }

    #[tokio::test]
    async fn test_make_parameter() {
        let (_store, ctx) = fresh_context("ctx-param").await;

        assert_eq!(ctx.make_parameter("").unwrap(), json!({}));
        assert_eq!(
            ctx.make_parameter(r#"{"replicas": 2}"#).unwrap(),
            json!({"replicas": 2})
        );
        assert!(ctx.make_parameter("{broken").is_err());
        cleanup_memory_store_for_test("ctx-param");
    }

    fn cleanup_memory_store_for_test(run: &str) {
        crate::memstore::cleanup_memory_store(run, "default");
    }
}
