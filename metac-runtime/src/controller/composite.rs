//! §4.G "Composite specifics" — owns the child selector and its optional `controller-uid`
//! generation, mirroring how a ReplicaSet reads `spec.selector` off each instance rather than
//! off controller-level configuration.
use super::Selector;
use crate::applier::UpdateStrategy;
use crate::error::{Error, Result};
use metac_core::Object;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct CompositeSpec {
    /// Whether a `controller-uid=<parent.uid>` label is required on (and injected into) every
    /// child, on top of whatever `spec.selector` the parent itself carries (§4.G "Selector
    /// generation").
    pub generate_selector: bool,
    pub strategies: HashMap<(String, String), UpdateStrategy>,
}

impl CompositeSpec {
    /// The selector that governs which existing objects count as this parent's children:
    /// read off `parent.spec.selector.matchLabels`, plus the generated `controller-uid` label
    /// when configured (§3: "from parent's `spec.selector` or generated `controller-uid`").
    pub fn parent_selector(&self, parent: &Object) -> Selector {
        let mut match_labels: BTreeMap<String, String> = parent
            .spec()
            .and_then(|s| s.pointer("/selector/matchLabels"))
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        if self.generate_selector {
            match_labels.insert("controller-uid".to_string(), parent.uid().to_string());
        }
        Selector { match_labels, match_annotations: BTreeMap::new() }
    }

    /// §4.G invariant: a selector that matches everything is rejected outright, since it would
    /// let this configuration adopt every object of the child kind in the cluster.
    pub fn validate(&self, parent: &Object) -> Result<()> {
        if self.parent_selector(parent).is_empty() {
            return Err(Error::EmptySelector);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parent(selector_labels: Option<serde_json::Value>) -> Object {
        let mut v = json!({
            "apiVersion": "examples.io/v1",
            "kind": "Parent",
            "metadata": {"name": "p1", "namespace": "ns", "uid": "parent-u1"},
        });
        if let Some(labels) = selector_labels {
            v["spec"] = json!({"selector": {"matchLabels": labels}});
        }
        Object::new(v)
    }

    #[test]
    fn reads_selector_off_parent_spec() {
        let c = CompositeSpec::default();
        let p = parent(Some(json!({"app": "x"})));
        let sel = c.parent_selector(&p);
        assert_eq!(sel.match_labels.get("app"), Some(&"x".to_string()));
        assert!(!sel.match_labels.contains_key("controller-uid"));
    }

    #[test]
    fn generated_selector_adds_controller_uid() {
        let c = CompositeSpec { generate_selector: true, ..Default::default() };
        let p = parent(None);
        let sel = c.parent_selector(&p);
        assert_eq!(sel.match_labels.get("controller-uid"), Some(&"parent-u1".to_string()));
    }

    #[test]
    fn empty_selector_is_rejected() {
        let c = CompositeSpec::default();
        let p = parent(None);
        assert!(matches!(c.validate(&p), Err(Error::EmptySelector)));
    }
}
