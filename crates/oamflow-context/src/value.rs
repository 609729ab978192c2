//! Structured value tree backing `vars`
//!
//! The tree is a JSON document addressed by dotted paths. It stands in
//! for the full value-expression language: `lookup`/`fill` navigate and
//! merge, `make` compiles a string expression into a value, `render`
//! produces the canonical persisted form, and `unify` structurally merges
//! two documents.

use crate::error::{ContextError, Result};
use crate::util::join_paths;
use serde_json::{json, Value};

/// A JSON value tree addressable by dotted paths
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTree {
    root: Value,
}

impl Default for ValueTree {
    fn default() -> Self {
        Self { root: json!({}) }
    }
}

impl ValueTree {
    /// Compile a string expression into a tree. Empty input yields an
    /// empty document.
    pub fn new(expr: &str) -> Result<Self> {
        Ok(Self {
            root: make_value(expr)?,
        })
    }

    /// Wrap an existing value
    pub fn from_value(value: Value) -> Self {
        Self { root: value }
    }

    /// The underlying document
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Look up the value at a dotted path
    pub fn lookup(&self, paths: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for seg in paths {
            current = current.as_object()?.get(*seg)?;
        }
        Some(current)
    }

    /// Fill a value in at a dotted path, creating intermediate objects.
    ///
    /// Objects merge structurally; any other value replaces what was
    /// there. Refuses to descend through an existing non-object value.
    pub fn fill(&mut self, value: Value, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            unify(&mut self.root, &value);
            return Ok(());
        }
        let mut current = &mut self.root;
        for (i, seg) in paths.iter().enumerate() {
            let map = current
                .as_object_mut()
                .ok_or_else(|| ContextError::InvalidPath {
                    path: join_paths(&paths[..=i]),
                })?;
            if i == paths.len() - 1 {
                match map.get_mut(*seg) {
                    Some(existing) => unify(existing, &value),
                    None => {
                        map.insert(seg.to_string(), value);
                    }
                }
                return Ok(());
            }
            current = map
                .entry(seg.to_string())
                .or_insert_with(|| json!({}));
        }
        Ok(())
    }

    /// Structurally merge another document into this one
    pub fn unify_with(&mut self, patch: &Value) {
        unify(&mut self.root, patch);
    }

    /// Render the canonical persisted form
    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.root)?)
    }

    /// Labels of the document's top-level fields
    pub fn top_level_labels(&self) -> Vec<String> {
        self.root
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every top-level field whose label is in `labels`
    pub fn remove_top_level(&mut self, labels: &[String]) {
        if let Some(map) = self.root.as_object_mut() {
            map.retain(|k, _| !labels.iter().any(|l| l == k));
        }
    }
}

/// Compile a string expression into a value. Empty input yields an empty
/// object.
pub fn make_value(expr: &str) -> Result<Value> {
    if expr.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(expr).map_err(ContextError::InvalidExpression)
}

/// Structural unification: objects merge field by field recursively, any
/// other pairing replaces the destination.
pub fn unify(dst: &mut Value, patch: &Value) {
    match (dst, patch) {
        (Value::Object(dst_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match dst_map.get_mut(key) {
                    Some(existing) => unify(existing, value),
                    None => {
                        dst_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dst, patch) => *dst = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_value_empty() {
        assert_eq!(make_value("").unwrap(), json!({}));
        assert_eq!(make_value("  ").unwrap(), json!({}));
        assert!(make_value("{nope").is_err());
    }

    #[test]
    fn test_lookup() {
        let tree = ValueTree::from_value(json!({"a": {"b": {"c": 1}}}));
        assert_eq!(tree.lookup(&["a", "b", "c"]), Some(&json!(1)));
        assert_eq!(tree.lookup(&["a", "b"]), Some(&json!({"c": 1})));
        assert_eq!(tree.lookup(&["a", "missing"]), None);
        assert_eq!(tree.lookup(&["a", "b", "c", "d"]), None);
    }

    #[test]
    fn test_fill_creates_intermediates() {
        let mut tree = ValueTree::default();
        tree.fill(json!("hello"), &["outputs", "greeting"]).unwrap();
        assert_eq!(tree.lookup(&["outputs", "greeting"]), Some(&json!("hello")));
    }

    #[test]
    fn test_fill_merges_objects() {
        let mut tree = ValueTree::from_value(json!({"cfg": {"replicas": 1}}));
        tree.fill(json!({"image": "nginx"}), &["cfg"]).unwrap();
        assert_eq!(
            tree.as_value(),
            &json!({"cfg": {"replicas": 1, "image": "nginx"}})
        );
    }

    #[test]
    fn test_fill_replaces_scalars() {
        let mut tree = ValueTree::from_value(json!({"count": 1}));
        tree.fill(json!(2), &["count"]).unwrap();
        assert_eq!(tree.lookup(&["count"]), Some(&json!(2)));
    }

    #[test]
    fn test_fill_rejects_path_through_scalar() {
        let mut tree = ValueTree::from_value(json!({"count": 1}));
        let err = tree.fill(json!(2), &["count", "nested"]).unwrap_err();
        assert!(matches!(err, ContextError::InvalidPath { .. }));
    }

    #[test]
    fn test_unify() {
        let mut dst = json!({"a": {"x": 1}, "b": 2});
        unify(&mut dst, &json!({"a": {"y": 2}, "b": 3, "c": 4}));
        assert_eq!(dst, json!({"a": {"x": 1, "y": 2}, "b": 3, "c": 4}));
    }

    #[test]
    fn test_render_round_trip() {
        let tree = ValueTree::from_value(json!({"b": 1, "a": {"z": true}}));
        let rendered = tree.render().unwrap();
        let reloaded = ValueTree::new(&rendered).unwrap();
        assert_eq!(tree, reloaded);
        // canonical form is stable across render cycles
        assert_eq!(rendered, reloaded.render().unwrap());
    }

    #[test]
    fn test_remove_top_level() {
        let mut tree =
            ValueTree::from_value(json!({"keep": 1, "drop-a": 2, "drop-b": {"x": 3}}));
        tree.remove_top_level(&["drop-a".to_string(), "drop-b".to_string()]);
        assert_eq!(tree.as_value(), &json!({"keep": 1}));
        assert_eq!(tree.top_level_labels(), vec!["keep".to_string()]);
    }
}
