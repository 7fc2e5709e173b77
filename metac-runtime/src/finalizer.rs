//! §4.E — finalizer manager: adds/removes a single named finalizer string on the watched
//! object and decides whether finalize logic must run. Unlike `kube_runtime::finalizer`
//! (which drives a whole apply/cleanup state machine), this manager only owns the
//! finalizer-list mutation; the watch controller (§4.G) decides when to call it.
use metac_core::{DynamicClient, GroupVersionKind, Object};

/// One engine-owned finalizer per configuration (§3: "exactly one engine-owned finalizer
/// per configuration per watched object").
#[derive(Debug, Clone)]
pub struct FinalizerManager {
    pub name: String,
    pub enabled: bool,
}

impl FinalizerManager {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self { name: name.into(), enabled }
    }

    /// Deterministic finalizer name for a configuration (§3): `<domain>/<kind>-<name>`.
    pub fn name_for(domain: &str, controller_kind: &str, controller_name: &str) -> String {
        format!("{domain}/{}-{}", controller_kind.to_lowercase(), controller_name)
    }

    /// Adds or removes the finalizer to match `enabled`, unless the object is already in the
    /// desired state or (when enabling) already pending deletion — we never resurrect an
    /// object that's on its way out.
    pub async fn sync_object(
        &self,
        client: &DynamicClient,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        obj: &Object,
    ) -> metac_core::Result<Object> {
        if obj.has_finalizer(&self.name) == self.enabled {
            return Ok(obj.clone());
        }
        if self.enabled && obj.is_pending_deletion() {
            return Ok(obj.clone());
        }
        if self.enabled {
            client.add_finalizer(gvk, namespace, obj, &self.name).await
        } else {
            client.remove_finalizer(gvk, namespace, obj, &self.name).await
        }
    }

    /// True iff finalize logic must run for `obj` (§4.E): not subject to a GC finalizer, and
    /// carries this finalizer, and finalize is enabled for this configuration.
    pub fn should_finalize(&self, obj: &Object) -> bool {
        self.enabled && !obj.has_gc_finalizer() && obj.has_finalizer(&self.name)
    }

    /// Local, in-memory removal; caller is responsible for persisting it.
    pub fn remove_finalizer(&self, obj: &mut Object) {
        obj.remove_finalizer(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(finalizers: &[&str], deleting: bool) -> Object {
        let mut v = json!({"metadata": {"name": "p1", "finalizers": finalizers}});
        if deleting {
            v["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
        }
        Object::new(v)
    }

    #[test]
    fn deterministic_name() {
        assert_eq!(
            FinalizerManager::name_for("metac.example.io", "CompositeController", "my-ctrl"),
            "metac.example.io/compositecontroller-my-ctrl"
        );
    }

    #[test]
    fn should_finalize_requires_enabled_and_present_and_not_gc_owned() {
        let fm = FinalizerManager::new("f1", true);
        assert!(fm.should_finalize(&obj(&["f1"], false)));
        assert!(!fm.should_finalize(&obj(&[], false)));
        assert!(!fm.should_finalize(&obj(&["f1", "foregroundDeletion"], false)));

        let disabled = FinalizerManager::new("f1", false);
        assert!(!disabled.should_finalize(&obj(&["f1"], false)));
    }

    #[test]
    fn local_removal_is_idempotent() {
        let fm = FinalizerManager::new("f1", true);
        let mut o = obj(&["f1", "other"], false);
        fm.remove_finalizer(&mut o);
        assert_eq!(o.finalizers(), vec!["other".to_string()]);
        fm.remove_finalizer(&mut o); // no-op, already gone
        assert_eq!(o.finalizers(), vec!["other".to_string()]);
    }
}
