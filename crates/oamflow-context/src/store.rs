//! Durable backing store for the workflow context
//!
//! This trait abstracts the cluster round-trips for the context object.
//! The in-memory implementation backs tests and the ephemeral-context
//! mode; a kube-client implementation can be injected without touching
//! the context logic.

use crate::error::{ContextError, Result};
use async_trait::async_trait;
use oamflow_api::ConfigMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Trait for persisting the per-run context object
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Get an object by namespace and name
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Create an object; returns the stored form (with resource version)
    async fn create(&self, cm: &ConfigMap) -> Result<ConfigMap>;

    /// Merge-patch an object's data onto the latest stored version.
    ///
    /// Unlike [`update`](Self::update) this does not fail on a stale
    /// resource version; keys present in `cm` win, other keys survive.
    async fn patch(&self, cm: &ConfigMap) -> Result<ConfigMap>;

    /// Replace an object, failing with [`ContextError::Conflict`] when
    /// the resource version is stale
    async fn update(&self, cm: &ConfigMap) -> Result<ConfigMap>;

    /// Delete an object; not-found is an error the caller may tolerate
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// In-memory ConfigMap store
///
/// A process-wide registry keyed by `namespace/name`, with resource
/// versions bumped on every write so conflict semantics can be tested.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    objects: RwLock<HashMap<String, ConfigMap>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared store instance for ephemeral-context mode
    pub fn shared() -> Arc<InMemoryConfigStore> {
        static SHARED: once_cell::sync::Lazy<Arc<InMemoryConfigStore>> =
            once_cell::sync::Lazy::new(|| Arc::new(InMemoryConfigStore::new()));
        SHARED.clone()
    }

    fn bump_version(cm: &mut ConfigMap) {
        let next = cm
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        cm.metadata.resource_version = Some(next.to_string());
    }
}

#[async_trait]
impl ConfigMapStore for InMemoryConfigStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let key = format!("{namespace}/{name}");
        Ok(self.objects.read().unwrap().get(&key).cloned())
    }

    async fn create(&self, cm: &ConfigMap) -> Result<ConfigMap> {
        let mut stored = cm.clone();
        Self::bump_version(&mut stored);
        self.objects
            .write()
            .unwrap()
            .insert(stored.object_key(), stored.clone());
        Ok(stored)
    }

    async fn patch(&self, cm: &ConfigMap) -> Result<ConfigMap> {
        let key = cm.object_key();
        let mut objects = self.objects.write().unwrap();
        let mut merged = match objects.get(&key) {
            Some(existing) => {
                let mut base = existing.clone();
                base.metadata.annotations = cm.metadata.annotations.clone();
                for (k, v) in &cm.data {
                    base.data.insert(k.clone(), v.clone());
                }
                base
            }
            None => cm.clone(),
        };
        Self::bump_version(&mut merged);
        objects.insert(key, merged.clone());
        Ok(merged)
    }

    async fn update(&self, cm: &ConfigMap) -> Result<ConfigMap> {
        let key = cm.object_key();
        let mut objects = self.objects.write().unwrap();
        if let Some(existing) = objects.get(&key) {
            if existing.metadata.resource_version != cm.metadata.resource_version {
                return Err(ContextError::Conflict(key));
            }
        }
        let mut stored = cm.clone();
        Self::bump_version(&mut stored);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{namespace}/{name}");
        match self.objects.write().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ContextError::StoreNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
