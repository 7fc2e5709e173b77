//! The three-way merge (§4.F "Merge"): kubectl-apply-style reconciliation of `lastApplied`,
//! `observed` and `desired`, operating directly on the dynamic JSON representation per §9's
//! design note ("strategic merge works on this representation directly").
use serde_json::{Map, Value};

/// Returns the merge key field name for a well-known array, keyed by the array's own field
/// name (not its full path — the spec treats these as globally well-known, matching how
/// Kubernetes' own strategic-merge-patch keys are scoped per field name across the whole
/// object tree).
fn array_merge_key(field_name: &str) -> Option<ArrayKey> {
    match field_name {
        "ownerReferences" => Some(ArrayKey::Field("uid")),
        "finalizers" => Some(ArrayKey::SelfValue),
        "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes" | "volumeMounts" => {
            Some(ArrayKey::Field("name"))
        }
        "ports" => Some(ArrayKey::ContainerPort),
        _ => None,
    }
}

enum ArrayKey {
    /// Key by `item[field]`.
    Field(&'static str),
    /// Key by the scalar item itself (e.g. a list of finalizer strings).
    SelfValue,
    /// Key by `containerPort` + `protocol` (defaulting protocol to `TCP`), per `ports`.
    ContainerPort,
}

fn item_key(kind: &ArrayKey, item: &Value) -> Option<String> {
    match kind {
        ArrayKey::Field(f) => item.get(f).and_then(Value::as_str).map(String::from),
        ArrayKey::SelfValue => item.as_str().map(String::from),
        ArrayKey::ContainerPort => {
            let port = item.get("containerPort")?;
            let proto = item.get("protocol").and_then(Value::as_str).unwrap_or("TCP");
            Some(format!("{port}/{proto}"))
        }
    }
}

/// Merges an array field using its well-known key: desired entries win (in desired order),
/// observed entries whose key was under `lastApplied` but dropped from `desired` are removed
/// (the hook stopped managing them), everything else from `observed` is preserved untouched.
fn merge_array(field_name: &str, observed: &[Value], desired: &[Value], last_applied: &[Value]) -> Vec<Value> {
    let Some(key_kind) = array_merge_key(field_name) else {
        return desired.to_vec(); // not a well-known key: full replace
    };

    let desired_keys: Vec<Option<String>> = desired.iter().map(|v| item_key(&key_kind, v)).collect();
    let last_applied_keys: std::collections::HashSet<String> = last_applied
        .iter()
        .filter_map(|v| item_key(&key_kind, v))
        .collect();
    let observed_by_key: std::collections::HashMap<String, &Value> = observed
        .iter()
        .filter_map(|v| item_key(&key_kind, v).map(|k| (k, v)))
        .collect();

    let mut out = Vec::with_capacity(desired.len());
    for (item, key) in desired.iter().zip(desired_keys.iter()) {
        match key {
            Some(k) => match observed_by_key.get(k) {
                Some(Value::Object(obs_map)) if item.is_object() => {
                    let last = last_applied
                        .iter()
                        .find(|l| item_key(&key_kind, l).as_deref() == Some(k.as_str()))
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    out.push(Value::Object(merge_objects(obs_map, item.as_object().unwrap(), &last)));
                }
                _ => out.push(item.clone()),
            },
            None => out.push(item.clone()),
        }
    }

    for item in observed {
        let Some(k) = item_key(&key_kind, item) else { continue };
        if desired_keys.iter().any(|dk| dk.as_deref() == Some(k.as_str())) {
            continue; // already emitted above, possibly merged
        }
        if last_applied_keys.contains(&k) {
            continue; // hook stopped managing this entry: drop it
        }
        out.push(item.clone()); // foreign entry, not ours to touch
    }
    out
}

/// Merges two JSON objects field by field per §4.F's algorithm.
pub fn merge_objects(observed: &Map<String, Value>, desired: &Map<String, Value>, last_applied: &Map<String, Value>) -> Map<String, Value> {
    let mut result = observed.clone();

    let mut keys: Vec<&String> = desired.keys().chain(last_applied.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        match desired.get(key) {
            Some(desired_val) => {
                let observed_val = observed.get(key);
                let last_val = last_applied.get(key);
                result.insert(key.clone(), merge_field(key, observed_val, desired_val, last_val));
            }
            None => {
                // lastApplied had it, desired doesn't: the hook intentionally stopped
                // managing this field.
                result.remove(key);
            }
        }
    }
    result
}

fn merge_field(field_name: &str, observed: Option<&Value>, desired: &Value, last_applied: Option<&Value>) -> Value {
    match (observed, desired) {
        (Some(Value::Object(o)), Value::Object(d)) => {
            let last = last_applied.and_then(Value::as_object).cloned().unwrap_or_default();
            Value::Object(merge_objects(o, d, &last))
        }
        (Some(Value::Array(o)), Value::Array(d)) => {
            let last = last_applied.and_then(Value::as_array).cloned().unwrap_or_default();
            Value::Array(merge_array(field_name, o, d, &last))
        }
        _ => desired.clone(),
    }
}

/// Top-level entry point: merges `observed` and `desired` full objects using `lastApplied`
/// (or an empty object if none was recorded, per §4.F: "default empty").
pub fn three_way_merge(observed: &Value, desired: &Value, last_applied: Option<&Value>) -> Value {
    let empty = Map::new();
    let o = observed.as_object().unwrap_or(&empty);
    let d = desired.as_object().unwrap_or(&empty);
    let l = last_applied.and_then(Value::as_object).unwrap_or(&empty);
    Value::Object(merge_objects(o, d, l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn desired_field_overrides_observed() {
        let observed = json!({"spec": {"image": "v1", "replicas": 3}});
        let desired = json!({"spec": {"image": "v2"}});
        let merged = three_way_merge(&observed, &desired, None);
        assert_eq!(merged["spec"]["image"], json!("v2"));
        // replicas wasn't touched by desired or lastApplied: preserved
        assert_eq!(merged["spec"]["replicas"], json!(3));
    }

    #[test]
    fn field_dropped_from_desired_and_previously_applied_is_removed() {
        let observed = json!({"spec": {"image": "v1", "nodeSelector": {"disk": "ssd"}}});
        let last_applied = json!({"spec": {"image": "v1", "nodeSelector": {"disk": "ssd"}}});
        let desired = json!({"spec": {"image": "v2"}}); // hook stopped setting nodeSelector
        let merged = three_way_merge(&observed, &desired, Some(&last_applied));
        assert!(merged["spec"].get("nodeSelector").is_none());
    }

    #[test]
    fn field_never_managed_by_us_is_left_alone() {
        // another controller set `status` on this child; we never mentioned it anywhere.
        let observed = json!({"spec": {"image": "v1"}, "status": {"phase": "Running"}});
        let desired = json!({"spec": {"image": "v1"}});
        let merged = three_way_merge(&observed, &desired, None);
        assert_eq!(merged["status"]["phase"], json!("Running"));
    }

    #[test]
    fn container_list_merges_by_name() {
        let observed = json!({"spec": {"containers": [
            {"name": "app", "image": "v1", "ports": [{"containerPort": 8080, "protocol": "TCP"}]},
            {"name": "sidecar", "image": "logging:v1"}
        ]}});
        let last_applied = json!({"spec": {"containers": [
            {"name": "app", "image": "v1"}
        ]}});
        let desired = json!({"spec": {"containers": [
            {"name": "app", "image": "v2"}
        ]}});
        let merged = three_way_merge(&observed, &desired, Some(&last_applied));
        let containers = merged["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2); // sidecar (foreign to us) preserved
        let app = containers.iter().find(|c| c["name"] == "app").unwrap();
        assert_eq!(app["image"], json!("v2"));
        // app's ports were never mentioned by desired or lastApplied: preserved
        assert_eq!(app["ports"][0]["containerPort"], json!(8080));
    }

    #[test]
    fn ownerreferences_merge_by_uid() {
        let observed = json!({"metadata": {"ownerReferences": [
            {"uid": "u1", "controller": true},
            {"uid": "other-owner"}
        ]}});
        let desired = json!({"metadata": {"ownerReferences": [
            {"uid": "u1", "controller": true, "blockOwnerDeletion": true}
        ]}});
        let merged = three_way_merge(&observed, &desired, None);
        let refs = merged["metadata"]["ownerReferences"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn finalizers_merge_preserves_foreign_entries() {
        let observed = json!({"metadata": {"finalizers": ["ours", "someone-elses"]}});
        let last_applied = json!({"metadata": {"finalizers": ["ours"]}});
        let desired = json!({"metadata": {"finalizers": []}}); // we stopped requiring "ours"
        let merged = three_way_merge(&observed, &desired, Some(&last_applied));
        let fins: Vec<&str> = merged["metadata"]["finalizers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(fins, vec!["someone-elses"]);
    }

    #[test]
    fn idempotent_on_identical_second_apply() {
        let observed = json!({"spec": {"image": "v2"}});
        let desired = json!({"spec": {"image": "v2"}});
        let last_applied = json!({"spec": {"image": "v2"}});
        let merged = three_way_merge(&observed, &desired, Some(&last_applied));
        assert_eq!(merged, observed);
    }
}
