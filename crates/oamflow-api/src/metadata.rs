//! Common metadata types shared by all resources

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kubernetes-style object metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name (required)
    pub name: String,

    /// Namespace (optional, defaults to "default")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Unique identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Resource version for optimistic concurrency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Labels for organizing resources
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Annotations for storing arbitrary metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    /// Owners of this object; garbage collection follows these
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl ObjectMeta {
    /// Create new metadata with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create new metadata with name and namespace
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the owner references
    pub fn with_owner_references(mut self, owners: Vec<OwnerReference>) -> Self {
        self.owner_references = owners;
        self
    }

    /// The namespace, or "default" when unset
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }

    /// Key identifying this object within a cluster-wide map
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.namespace_or_default(), self.name)
    }
}

/// Type metadata for resource objects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// API version (e.g., "core.oam.dev/v1alpha1")
    pub api_version: String,

    /// Kind (e.g., "WorkflowRun", "ConfigMap")
    pub kind: String,
}

impl TypeMeta {
    /// Create type metadata for WorkflowRun
    pub fn workflow_run() -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            kind: crate::WORKFLOW_RUN_KIND.to_string(),
        }
    }

    /// Create type metadata for ConfigMap
    pub fn config_map() -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        }
    }
}

/// Reference from an owned object back to its owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// API version of the owner
    pub api_version: String,

    /// Kind of the owner
    pub kind: String,

    /// Name of the owner
    pub name: String,

    /// UID of the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Whether this reference points at the managing controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,

    /// Whether the owner blocks deletion of this object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Build a controller owner reference to a WorkflowRun
    pub fn controller(name: impl Into<String>, uid: Option<Uuid>) -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            kind: crate::WORKFLOW_RUN_KIND.to_string(),
            name: name.into(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

/// Reference to another object, as recorded in a status field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_meta_new() {
        let meta = ObjectMeta::new("demo-run");
        assert_eq!(meta.name, "demo-run");
        assert!(meta.namespace.is_none());
        assert!(meta.labels.is_empty());
        assert_eq!(meta.namespace_or_default(), "default");
    }

    #[test]
    fn test_object_meta_with_namespace() {
        let meta = ObjectMeta::with_namespace("demo-run", "production");
        assert_eq!(meta.namespace, Some("production".to_string()));
        assert_eq!(meta.object_key(), "production/demo-run");
    }

    #[test]
    fn test_object_meta_builders() {
        let meta = ObjectMeta::new("demo")
            .with_label("app", "web")
            .with_annotation("note", "hello");

        assert_eq!(meta.labels.get("app"), Some(&"web".to_string()));
        assert_eq!(meta.annotations.get("note"), Some(&"hello".to_string()));
    }

    #[test]
    fn test_type_meta_workflow_run() {
        let meta = TypeMeta::workflow_run();
        assert_eq!(meta.api_version, "core.oam.dev/v1alpha1");
        assert_eq!(meta.kind, "WorkflowRun");
    }

    #[test]
    fn test_owner_reference_controller() {
        let owner = OwnerReference::controller("demo-run", None);
        assert_eq!(owner.kind, "WorkflowRun");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_object_meta_serialization() {
        let meta = ObjectMeta::with_namespace("demo", "default")
            .with_owner_references(vec![OwnerReference::controller("demo", None)]);

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"ownerReferences\""));
        let parsed: ObjectMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, parsed);
    }
}
