//! ConfigMap object backing the durable workflow context

use crate::metadata::{ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved data key holding serialized component manifests
pub const CONFIG_MAP_KEY_COMPONENTS: &str = "components";

/// Reserved data key holding the serialized vars document
pub const CONFIG_MAP_KEY_VARS: &str = "vars";

/// Annotation recording when the workflow context was created
pub const ANNOTATION_START_TIMESTAMP: &str = "vela.io/startTime";

/// A config-map-like object holding per-run workflow state.
///
/// Data is an ordered map so two commits of equal content produce
/// byte-identical serializations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// Type metadata (apiVersion, kind)
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    /// Object metadata (name, namespace, owners, etc.)
    pub metadata: ObjectMeta,

    /// String key/value payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create an empty ConfigMap with the given metadata
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            type_meta: TypeMeta::config_map(),
            metadata,
            data: BTreeMap::new(),
        }
    }

    /// Get a data value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.as_str())
    }

    /// Insert a data value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove a data value, returning whether it was present
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Key identifying this object within a cluster-wide map
    pub fn object_key(&self) -> String {
        self.metadata.object_key()
    }
}
