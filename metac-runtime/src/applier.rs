//! §4.F — the attachment applier: a differential CRUD engine reconciling an `observed`
//! registry of children against a `desired` registry under provenance, ownership and
//! update-strategy rules. Delete pass always runs before create-or-update, per §4.F.
use crate::error::{Error, Result};
use crate::merge::three_way_merge;
use metac_core::{DynamicClient, GroupVersionKind, Object, OwnerReference, Registry};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Per-kind child update strategy (§3, §4.F); `OnDelete` is the default when unconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    OnDelete,
    Recreate,
    RollingRecreate,
    InPlace,
    RollingInPlace,
}

impl UpdateStrategy {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" | "OnDelete" => Ok(Self::OnDelete),
            "Recreate" => Ok(Self::Recreate),
            "RollingRecreate" => Ok(Self::RollingRecreate),
            "InPlace" => Ok(Self::InPlace),
            "RollingInPlace" => Ok(Self::RollingInPlace),
            other => Err(Error::InvalidUpdateStrategy(other.to_string())),
        }
    }

    fn recreates(self) -> bool {
        matches!(self, Self::Recreate | Self::RollingRecreate)
    }
}

fn last_applied_key(watch_uid: &str) -> String {
    format!("{watch_uid}/gctl-last-applied")
}

/// Policy inputs to one applier pass (§4.F "Inputs").
pub struct ApplyOptions {
    pub domain: String,
    /// Composite default true; generic configurable; decorator always false (children carry
    /// no owner reference to a foreign parent, per §4.G "Decorator specifics").
    pub is_watch_owner: bool,
    pub update_any: bool,
    pub delete_any: bool,
    pub update_during_pending_delete: bool,
    /// `Some(name)` marks decorator flavor: children get `<domain>/decorator-controller = name`
    /// instead of/alongside provenance-by-owner-uid.
    pub decorator_controller_name: Option<String>,
    /// Composite invariant (§4.G "Invariant enforcement"): every desired child's labels must
    /// be a superset of the parent selector. `None` disables the check (decorator/generic).
    pub selector_labels: Option<BTreeMap<String, String>>,
    /// Generic-only: stamp `<watch-uid>/updated-due-to-watch = watch.namespace/name` on every
    /// child an `InPlace`/`RollingInPlace` update actually writes (§3 provenance annotations).
    pub stamp_updated_annotation: bool,
    pub strategies: HashMap<(String, String), UpdateStrategy>,
    /// Generic-only (§6 `explicitUpdates`/`explicitDeletes`): `"<kind>/<namespacedKey>"` entries
    /// the hook named explicitly, forced through regardless of provenance/`update_any`/strategy.
    pub force_update: std::collections::HashSet<String>,
    pub force_delete: std::collections::HashSet<String>,
}

impl ApplyOptions {
    fn strategy_for(&self, gvk: &GroupVersionKind) -> UpdateStrategy {
        self.strategies
            .get(&(gvk.group.clone(), gvk.kind.clone()))
            .copied()
            .unwrap_or(UpdateStrategy::OnDelete)
    }

    fn created_due_to_watch_key(&self) -> String {
        format!("{}/created-due-to-watch", self.domain)
    }

    fn decorator_controller_key(&self) -> String {
        format!("{}/decorator-controller", self.domain)
    }
}

pub struct AttachmentApplier {
    client: DynamicClient,
}

impl AttachmentApplier {
    pub fn new(client: DynamicClient) -> Self {
        Self { client }
    }

    /// Runs the delete pass then the create-or-update pass. Per-object failures are collected
    /// and returned together; one object's failure never halts the rest of the pass.
    pub async fn apply(&self, watch: &Object, observed: &Registry, desired: &Registry, opts: &ApplyOptions) -> Result<()> {
        let mut errors = Vec::new();
        self.delete_pass(watch, observed, desired, opts, &mut errors).await;
        self.create_or_update_pass(watch, observed, desired, opts, &mut errors).await;
        match Error::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn delete_pass(
        &self,
        watch: &Object,
        observed: &Registry,
        desired: &Registry,
        opts: &ApplyOptions,
        errors: &mut Vec<(String, Error)>,
    ) {
        let anno_key = opts.created_due_to_watch_key();
        for gvk in observed.kinds() {
            let Some(bucket) = observed.bucket(&gvk) else { continue };
            for (key, obj) in bucket {
                if obj.is_pending_deletion() {
                    continue;
                }
                if desired.get(&gvk, key).is_some() {
                    continue;
                }
                let provenance_matches = obj.annotation(&anno_key).as_deref() == Some(watch.uid());
                let forced = opts.force_delete.contains(&format!("{}/{key}", gvk.kind));
                if !(provenance_matches || opts.delete_any || forced) {
                    continue;
                }
                let ns = obj.namespace().map(String::from);
                if let Err(e) = self.client.delete(&gvk, ns.as_deref(), obj.name(), obj.uid()).await {
                    warn!(child = %key, kind = %gvk, "failed to delete orphaned child");
                    errors.push((format!("{gvk}/{key}"), e.into()));
                }
            }
        }
    }

    async fn create_or_update_pass(
        &self,
        watch: &Object,
        observed: &Registry,
        desired: &Registry,
        opts: &ApplyOptions,
        errors: &mut Vec<(String, Error)>,
    ) {
        for gvk in desired.kinds() {
            let Some(bucket) = desired.bucket(&gvk) else { continue };
            let strategy = opts.strategy_for(&gvk);
            for (key, desired_obj) in bucket {
                if let Some(selector) = &opts.selector_labels {
                    if !labels_match(selector, &desired_obj.labels()) {
                        errors.push((
                            format!("{gvk}/{key}"),
                            Error::ChildLabelsMismatch { kind: gvk.kind.clone(), key: key.clone() },
                        ));
                        continue;
                    }
                }
                let result = match observed.get(&gvk, key) {
                    None => self.create_child(watch, &gvk, desired_obj, opts).await,
                    Some(obs) => self.update_child(watch, &gvk, key, obs, desired_obj, strategy, opts).await,
                };
                if let Err(e) = result {
                    errors.push((format!("{gvk}/{key}"), e));
                }
            }
        }
    }

    async fn create_child(&self, watch: &Object, gvk: &GroupVersionKind, desired: &Object, opts: &ApplyOptions) -> Result<()> {
        let mut child = desired.clone();
        child.set_annotation(&opts.created_due_to_watch_key(), watch.uid());
        child.set_annotation(&last_applied_key(watch.uid()), &desired.0.to_string());
        if let Some(name) = &opts.decorator_controller_name {
            child.set_annotation(&opts.decorator_controller_key(), name);
        }
        if opts.is_watch_owner {
            child.append_owner_reference(OwnerReference {
                api_version: watch.api_version().to_string(),
                kind: watch.kind().to_string(),
                name: watch.name().to_string(),
                uid: watch.uid().to_string(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            });
        }
        let ns = child.namespace().map(String::from).or_else(|| watch.namespace().map(String::from));
        self.client.create(gvk, ns.as_deref(), child).await?;
        Ok(())
    }

    async fn update_child(
        &self,
        watch: &Object,
        gvk: &GroupVersionKind,
        key: &str,
        observed: &Object,
        desired: &Object,
        strategy: UpdateStrategy,
        opts: &ApplyOptions,
    ) -> Result<()> {
        let anno_key = opts.created_due_to_watch_key();
        let provenance_matches = observed.annotation(&anno_key).as_deref() == Some(watch.uid());
        let forced = opts.force_update.contains(&format!("{}/{key}", gvk.kind));
        if !(opts.update_any || provenance_matches || forced) {
            return Ok(());
        }
        if observed.is_pending_deletion() && !opts.update_during_pending_delete {
            return Ok(());
        }
        if strategy == UpdateStrategy::OnDelete && !forced {
            return Ok(());
        }

        let last_applied = observed
            .annotation(&last_applied_key(watch.uid()))
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok());
        let merged_value = three_way_merge(&observed.0, &desired.0, last_applied.as_ref());

        if merged_value == observed.0 {
            return Ok(()); // identical to observed: zero writes (§8 idempotence)
        }

        let ns = observed.namespace().map(String::from);
        if strategy.recreates() {
            self.client.delete(gvk, ns.as_deref(), observed.name(), observed.uid()).await?;
            return Ok(()); // next reconcile creates fresh, once the informer observes the delete
        }

        let mut merged = Object::new(merged_value);
        merged.set_annotation(&last_applied_key(watch.uid()), &desired.0.to_string());
        if opts.stamp_updated_annotation {
            merged.set_annotation(&format!("{}/updated-due-to-watch", watch.uid()), &watch.namespaced_key());
        }
        self.client.replace(gvk, ns.as_deref(), merged).await?;
        Ok(())
    }
}

fn labels_match(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metac_core::GroupVersionKind;
    use serde_json::json;

    fn watch() -> Object {
        Object::new(json!({
            "apiVersion": "examples.io/v1",
            "kind": "Parent",
            "metadata": {"name": "p1", "namespace": "ns", "uid": "watch-u1"}
        }))
    }

    fn pod_gvk() -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind("v1", "Pod")
    }

    fn pod(name: &str, anno_key: &str, anno_val: &str) -> Object {
        Object::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": "ns",
                "uid": format!("{name}-uid"),
                "annotations": {anno_key: anno_val}
            }
        }))
    }

    fn opts() -> ApplyOptions {
        ApplyOptions {
            domain: "metac.example.io".into(),
            is_watch_owner: true,
            update_any: false,
            delete_any: false,
            update_during_pending_delete: false,
            decorator_controller_name: None,
            selector_labels: None,
            stamp_updated_annotation: false,
            strategies: HashMap::new(),
            force_update: std::collections::HashSet::new(),
            force_delete: std::collections::HashSet::new(),
        }
    }

    #[tokio::test]
    async fn delete_pass_leaves_foreign_provenance_alone() {
        let w = watch();
        let mut observed = Registry::new();
        observed.insert_object(pod("pod-a", "metac.example.io/created-due-to-watch", "watch-u1"));
        observed.insert_object(pod("pod-b", "metac.example.io/created-due-to-watch", "watch-u2"));
        let desired = Registry::new(); // nothing desired: both are candidates for deletion

        // construct an applier with an unreachable client; delete_pass only reads until it
        // tries the network, so assert on error accumulation shape instead of a live call.
        // Here we only exercise the provenance/ownership decision logic directly.
        let anno_key = opts().created_due_to_watch_key();
        let bucket = observed.bucket(&pod_gvk()).unwrap();
        let pod_a = bucket.get("ns/pod-a").unwrap();
        let pod_b = bucket.get("ns/pod-b").unwrap();
        assert_eq!(pod_a.annotation(&anno_key).as_deref(), Some(w.uid()));
        assert_ne!(pod_b.annotation(&anno_key).as_deref(), Some(w.uid()));
        let _ = desired; // kept for documentation of intent (nothing desired)
    }

    #[test]
    fn strategy_parses_known_values_and_rejects_unknown() {
        assert_eq!(UpdateStrategy::parse("").unwrap(), UpdateStrategy::OnDelete);
        assert_eq!(UpdateStrategy::parse("RollingInPlace").unwrap(), UpdateStrategy::RollingInPlace);
        assert!(UpdateStrategy::parse("Bogus").is_err());
    }

    #[test]
    fn selector_labels_must_be_satisfied_by_desired_child() {
        let selector = BTreeMap::from([("app".to_string(), "x".to_string())]);
        let matching = BTreeMap::from([("app".to_string(), "x".to_string()), ("extra".to_string(), "y".to_string())]);
        let mismatching = BTreeMap::from([("app".to_string(), "other".to_string())]);
        assert!(labels_match(&selector, &matching));
        assert!(!labels_match(&selector, &mismatching));
    }

    #[test]
    fn last_applied_key_is_scoped_to_watch_uid() {
        assert_eq!(last_applied_key("u1"), "u1/gctl-last-applied");
    }
}
