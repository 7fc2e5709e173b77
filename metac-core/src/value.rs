//! The schema-less object model (§3, §9): a thin typed facade over `serde_json::Value`
//! with accessors for the well-known `metadata.*` fields every component needs, without
//! forcing a concrete Rust struct on whatever kind the hook happens to be managing.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A reference to the controlling object of some other object (`ownerReferences[i]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(rename = "blockOwnerDeletion", default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// A dynamic, schema-less Kubernetes object: `apiVersion`/`kind`/`metadata`/`spec`/`status`
/// backed directly by a JSON value (§9's "recursive JSON value" design note).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(pub Value);

impl Object {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn api_version(&self) -> &str {
        self.0
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.meta_str("name")
    }

    pub fn namespace(&self) -> Option<&str> {
        let ns = self.meta_str("namespace");
        if ns.is_empty() {
            None
        } else {
            Some(ns)
        }
    }

    /// `namespace/name` if namespaced, else just `name`.
    pub fn namespaced_key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{ns}/{}", self.name()),
            None => self.name().to_string(),
        }
    }

    pub fn uid(&self) -> &str {
        self.meta_str("uid")
    }

    pub fn resource_version(&self) -> &str {
        self.meta_str("resourceVersion")
    }

    pub fn generation(&self) -> i64 {
        self.0
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    pub fn deletion_timestamp(&self) -> Option<&str> {
        self.0
            .pointer("/metadata/deletionTimestamp")
            .and_then(Value::as_str)
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.deletion_timestamp().is_some()
    }

    fn meta_str(&self, field: &str) -> &str {
        self.0
            .pointer(&format!("/metadata/{field}"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        string_map_at(&self.0, "/metadata/labels")
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        string_map_at(&self.0, "/metadata/annotations")
    }

    pub fn annotation(&self, key: &str) -> Option<String> {
        self.annotations().get(key).cloned()
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        let annos = self.ensure_map("/metadata/annotations");
        annos.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn remove_annotation(&mut self, key: &str) {
        if let Some(Value::Object(m)) = self.0.pointer_mut("/metadata/annotations") {
            m.remove(key);
        }
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        let labels = self.ensure_map("/metadata/labels");
        labels.insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn remove_label(&mut self, key: &str) {
        if let Some(Value::Object(m)) = self.0.pointer_mut("/metadata/labels") {
            m.remove(key);
        }
    }

    pub fn finalizers(&self) -> Vec<String> {
        self.0
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    pub fn has_finalizer(&self, name: &str) -> bool {
        self.finalizers().iter().any(|f| f == name)
    }

    pub fn add_finalizer(&mut self, name: &str) {
        if self.has_finalizer(name) {
            return;
        }
        let arr = self.ensure_array("/metadata/finalizers");
        arr.push(Value::String(name.to_string()));
    }

    pub fn remove_finalizer(&mut self, name: &str) {
        if let Some(Value::Array(a)) = self.0.pointer_mut("/metadata/finalizers") {
            a.retain(|v| v.as_str() != Some(name));
        }
    }

    /// Does this object carry a garbage-collector finalizer (`foregroundDeletion`/`orphan`)?
    /// Those are owned by the API server's GC controller, not us.
    pub fn has_gc_finalizer(&self) -> bool {
        self.has_finalizer("foregroundDeletion") || self.has_finalizer("orphan")
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.0
            .pointer("/metadata/ownerReferences")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn controller_ref(&self) -> Option<OwnerReference> {
        self.owner_references()
            .into_iter()
            .find(|o| o.controller == Some(true))
    }

    pub fn set_owner_references(&mut self, refs: &[OwnerReference]) {
        let v = serde_json::to_value(refs).unwrap_or(Value::Array(vec![]));
        self.ensure_meta()["ownerReferences"] = v;
    }

    pub fn append_owner_reference(&mut self, r: OwnerReference) {
        let mut refs = self.owner_references();
        if refs.iter().any(|o| o.uid == r.uid) {
            return;
        }
        refs.push(r);
        self.set_owner_references(&refs);
    }

    pub fn status(&self) -> Option<&Value> {
        self.0.get("status")
    }

    pub fn set_status(&mut self, status: Value) {
        if let Value::Object(root) = &mut self.0 {
            root.insert("status".to_string(), status);
        }
    }

    pub fn spec(&self) -> Option<&Value> {
        self.0.get("spec")
    }

    fn ensure_meta(&mut self) -> &mut Map<String, Value> {
        if self.0.get("metadata").is_none() {
            if let Value::Object(root) = &mut self.0 {
                root.insert("metadata".to_string(), Value::Object(Map::new()));
            }
        }
        self.0
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
            .expect("metadata must be an object")
    }

    fn ensure_map(&mut self, pointer: &str) -> &mut Map<String, Value> {
        if self.0.pointer(pointer).is_none() {
            set_pointer(&mut self.0, pointer, Value::Object(Map::new()));
        }
        self.0.pointer_mut(pointer).and_then(Value::as_object_mut).unwrap()
    }

    fn ensure_array(&mut self, pointer: &str) -> &mut Vec<Value> {
        if self.0.pointer(pointer).is_none() {
            set_pointer(&mut self.0, pointer, Value::Array(vec![]));
        }
        self.0.pointer_mut(pointer).and_then(Value::as_array_mut).unwrap()
    }
}

fn string_map_at(v: &Value, pointer: &str) -> BTreeMap<String, String> {
    v.pointer(pointer)
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Sets a value at a `/`-separated JSON pointer, creating intermediate objects as needed.
/// Only ever called with pointers under `/metadata`, which always exists on a real object.
fn set_pointer(root: &mut Value, pointer: &str, value: Value) {
    let parts: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
    let mut cur = root;
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            if let Value::Object(m) = cur {
                m.insert(part.to_string(), value);
            }
            return;
        }
        if cur.get(*part).is_none() {
            if let Value::Object(m) = cur {
                m.insert(part.to_string(), Value::Object(Map::new()));
            }
        }
        cur = cur.get_mut(*part).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> Object {
        Object::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "pod-a",
                "namespace": "default",
                "uid": "u1",
                "labels": {"app": "x"}
            }
        }))
    }

    #[test]
    fn basic_accessors() {
        let p = pod();
        assert_eq!(p.api_version(), "v1");
        assert_eq!(p.kind(), "Pod");
        assert_eq!(p.name(), "pod-a");
        assert_eq!(p.namespace(), Some("default"));
        assert_eq!(p.namespaced_key(), "default/pod-a");
        assert_eq!(p.uid(), "u1");
        assert_eq!(p.labels().get("app"), Some(&"x".to_string()));
    }

    #[test]
    fn cluster_scoped_key_has_no_namespace_prefix() {
        let obj = Object::new(json!({"metadata": {"name": "n1"}}));
        assert_eq!(obj.namespace(), None);
        assert_eq!(obj.namespaced_key(), "n1");
    }

    #[test]
    fn finalizer_add_remove_is_idempotent() {
        let mut p = pod();
        assert!(!p.has_finalizer("f"));
        p.add_finalizer("f");
        p.add_finalizer("f");
        assert_eq!(p.finalizers(), vec!["f".to_string()]);
        p.remove_finalizer("f");
        assert!(!p.has_finalizer("f"));
    }

    #[test]
    fn annotation_set_and_remove_on_object_with_no_annotations_yet() {
        let mut p = pod();
        p.set_annotation("a/b", "v");
        assert_eq!(p.annotation("a/b"), Some("v".to_string()));
        p.remove_annotation("a/b");
        assert_eq!(p.annotation("a/b"), None);
    }

    #[test]
    fn owner_reference_roundtrip_and_dedup() {
        let mut p = pod();
        let r = OwnerReference {
            api_version: "v1".into(),
            kind: "Parent".into(),
            name: "parent-a".into(),
            uid: "pu1".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        p.append_owner_reference(r.clone());
        p.append_owner_reference(r.clone());
        assert_eq!(p.owner_references().len(), 1);
        assert_eq!(p.controller_ref().unwrap().uid, "pu1");
    }

    #[test]
    fn pending_deletion_detection() {
        let mut p = pod();
        assert!(!p.is_pending_deletion());
        p.0["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
        assert!(p.is_pending_deletion());
    }

    #[test]
    fn gc_finalizer_detection() {
        let mut p = pod();
        assert!(!p.has_gc_finalizer());
        p.add_finalizer("foregroundDeletion");
        assert!(p.has_gc_finalizer());
    }
}
