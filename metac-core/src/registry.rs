//! The two-level object registry (§3's "AnyUnstructRegistry"): keyed first by
//! `(apiVersion, kind)`, then by a per-kind string key (`namespace/name` or `name`).
use crate::resource::GroupVersionKind;
use crate::value::Object;
use std::collections::BTreeMap;

/// A registry of objects grouped by kind, as consumed/produced by the hook wire format and
/// the attachment applier (§4.F).
///
/// Invariant: all entries under one `(apiVersion, kind)` bucket share that kind. A bucket can
/// be present-but-empty, which is distinct from the kind never having been declared at all —
/// that distinction drives the "empty desired bucket deletes everything of that kind" boundary
/// behavior in §8.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    buckets: BTreeMap<GroupVersionKindKey, BTreeMap<String, Object>>,
}

/// `GroupVersionKind` wrapped so it orders/compares consistently as a `BTreeMap` key.
type GroupVersionKindKey = (String, String, String);

fn key_of(gvk: &GroupVersionKind) -> GroupVersionKindKey {
    (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a kind, creating an empty bucket if absent. Idempotent.
    pub fn declare_kind(&mut self, gvk: &GroupVersionKind) {
        self.buckets.entry(key_of(gvk)).or_default();
    }

    pub fn has_kind(&self, gvk: &GroupVersionKind) -> bool {
        self.buckets.contains_key(&key_of(gvk))
    }

    pub fn insert(&mut self, gvk: GroupVersionKind, key: String, obj: Object) {
        self.buckets.entry(key_of(&gvk)).or_default().insert(key, obj);
    }

    /// Inserts using the object's own `apiVersion`/`kind` and computed namespaced key.
    pub fn insert_object(&mut self, obj: Object) {
        let gvk = GroupVersionKind::from_api_version_kind(obj.api_version(), obj.kind());
        let key = obj.namespaced_key();
        self.insert(gvk, key, obj);
    }

    pub fn get(&self, gvk: &GroupVersionKind, key: &str) -> Option<&Object> {
        self.buckets.get(&key_of(gvk))?.get(key)
    }

    pub fn kinds(&self) -> impl Iterator<Item = GroupVersionKind> + '_ {
        self.buckets.keys().map(|(g, v, k)| GroupVersionKind {
            group: g.clone(),
            version: v.clone(),
            kind: k.clone(),
        })
    }

    pub fn bucket(&self, gvk: &GroupVersionKind) -> Option<&BTreeMap<String, Object>> {
        self.buckets.get(&key_of(gvk))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(BTreeMap::is_empty)
    }

    pub fn total_len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_gvk() -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind("v1", "Pod")
    }

    fn pod(name: &str) -> Object {
        Object::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name}}))
    }

    #[test]
    fn declared_empty_bucket_differs_from_undeclared() {
        let mut r = Registry::new();
        assert!(!r.has_kind(&pod_gvk()));
        r.declare_kind(&pod_gvk());
        assert!(r.has_kind(&pod_gvk()));
        assert_eq!(r.bucket(&pod_gvk()).unwrap().len(), 0);
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut r = Registry::new();
        r.insert_object(pod("pod-a"));
        assert!(r.get(&pod_gvk(), "pod-a").is_some());
        assert!(r.get(&pod_gvk(), "pod-b").is_none());
    }

    #[test]
    fn undeclared_kind_has_no_bucket() {
        let r = Registry::new();
        assert!(r.bucket(&pod_gvk()).is_none());
    }
}
