//! §4.B — the dynamic client: per-`(apiVersion, resource)` CRUD over [`kube::api::DynamicObject`],
//! plus the atomic-update/atomic-status-update/finalizer convenience the rest of the engine
//! builds on.
use crate::discovery::DiscoveryCache;
use crate::error::{Error, Result};
use crate::resource::GroupVersionKind;
use crate::value::Object;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use kube::api::{
    ApiResource as KubeApiResource, DeleteParams, DynamicObject, Patch, PatchParams, Preconditions,
    PropagationPolicy,
};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on the in-loop conflict-retry budget (§9: "a bounded exponential backoff inside the
/// atomic-update helper, distinct from the outer workqueue rate-limited retry" — typically
/// 5 attempts totalling well under 2s).
fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        multiplier: 2.0,
        max_interval: Duration::from_millis(1600),
        max_elapsed_time: Some(Duration::from_secs(2)),
        ..Default::default()
    }
}

const MAX_CONFLICT_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct DynamicClient {
    client: Client,
    discovery: DiscoveryCache,
}

impl DynamicClient {
    pub fn new(client: Client, discovery: DiscoveryCache) -> Self {
        Self { client, discovery }
    }

    fn kube_api_resource(&self, gvk: &GroupVersionKind) -> Result<KubeApiResource> {
        let ar = self.discovery.get_by_gvk(gvk)?;
        Ok(KubeApiResource {
            group: ar.group,
            version: ar.version,
            api_version: ar.api_version,
            kind: ar.kind,
            plural: ar.resource,
        })
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let ar = self.kube_api_resource(gvk)?;
        Ok(match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        })
    }

    pub async fn get(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<Option<Object>> {
        match self.api(gvk, namespace)?.get_opt(name).await? {
            Some(obj) => Ok(Some(to_object(obj)?)),
            None => Ok(None),
        }
    }

    pub async fn create(&self, gvk: &GroupVersionKind, namespace: Option<&str>, obj: Object) -> Result<Object> {
        let dyn_obj = from_object(obj, self.kube_api_resource(gvk)?)?;
        let created = self.api(gvk, namespace)?.create(&Default::default(), &dyn_obj).await?;
        to_object(created)
    }

    /// DELETE with `propagationPolicy=Background` and a UID precondition (§4.F delete pass).
    pub async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str, uid: &str) -> Result<()> {
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            preconditions: Some(Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..Default::default()
        };
        match self.api(gvk, namespace)?.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()), // tolerate NotFound (§7)
            Err(e) => Err(e.into()),
        }
    }

    /// PUT the merged object with its observed `resourceVersion` (§4.F `InPlace`/`RollingInPlace`).
    pub async fn replace(&self, gvk: &GroupVersionKind, namespace: Option<&str>, obj: Object) -> Result<Object> {
        let name = obj.name().to_string();
        let dyn_obj = from_object(obj, self.kube_api_resource(gvk)?)?;
        let replaced = self.api(gvk, namespace)?.replace(&name, &Default::default(), &dyn_obj).await?;
        to_object(replaced)
    }

    /// GET, check `uid` still matches, apply `mutate`, PUT with the GET's `resourceVersion`,
    /// retrying on 409 with bounded exponential backoff (§4.B).
    pub async fn atomic_update(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        orig: &Object,
        mut mutate: impl FnMut(&mut Object),
    ) -> Result<Object> {
        let mut backoff = conflict_backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let fetched = self
                .get(gvk, namespace, orig.name())
                .await?
                .ok_or_else(|| Error::NotFound(orig.namespaced_key()))?;
            if fetched.uid() != orig.uid() {
                return Err(Error::NotFound(orig.namespaced_key()));
            }
            let mut next = fetched;
            mutate(&mut next);
            match self.replace(gvk, namespace, next).await {
                Ok(updated) => return Ok(updated),
                Err(Error::Kube(kube::Error::Api(e))) if e.code == 409 && attempt < MAX_CONFLICT_ATTEMPTS => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_millis(100));
                    warn!(object = %orig.namespaced_key(), attempt, "conflict updating object, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(Error::Kube(kube::Error::Api(e))) if e.code == 409 => {
                    return Err(Error::Conflict(orig.namespaced_key()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Same as `atomic_update` but targets the `status` subresource when declared, else falls
    /// back to a plain update (§4.B).
    pub async fn atomic_status_update(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        orig: &Object,
        mut set_status: impl FnMut(&mut Object),
    ) -> Result<Object> {
        let ar = self.discovery.get_by_gvk(gvk)?;
        if !ar.has_subresource("status") {
            return self.atomic_update(gvk, namespace, orig, |o| set_status(o)).await;
        }
        let mut backoff = conflict_backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let fetched = self
                .get(gvk, namespace, orig.name())
                .await?
                .ok_or_else(|| Error::NotFound(orig.namespaced_key()))?;
            if fetched.uid() != orig.uid() {
                return Err(Error::NotFound(orig.namespaced_key()));
            }
            let mut next = fetched;
            set_status(&mut next);
            let status = next.status().cloned().unwrap_or(serde_json::json!({}));
            let patch = Patch::Merge(serde_json::json!({ "status": status }));
            let kube_ar = self.kube_api_resource(gvk)?;
            let api: Api<DynamicObject> = match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &kube_ar),
                None => Api::all_with(self.client.clone(), &kube_ar),
            };
            match api.patch_status(orig.name(), &PatchParams::default(), &patch).await {
                Ok(updated) => return to_object(updated),
                Err(kube::Error::Api(e)) if e.code == 409 && attempt < MAX_CONFLICT_ATTEMPTS => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_millis(100));
                    debug!(object = %orig.namespaced_key(), attempt, "conflict updating status, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    return Err(Error::Conflict(orig.namespaced_key()));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Adds `name` to `finalizers` if absent; short-circuits (no write) if already present.
    pub async fn add_finalizer(&self, gvk: &GroupVersionKind, namespace: Option<&str>, obj: &Object, name: &str) -> Result<Object> {
        if obj.has_finalizer(name) {
            return Ok(obj.clone());
        }
        let name = name.to_string();
        self.atomic_update(gvk, namespace, obj, move |o| o.add_finalizer(&name)).await
    }

    /// Removes `name` from `finalizers` if present; short-circuits if already absent.
    pub async fn remove_finalizer(&self, gvk: &GroupVersionKind, namespace: Option<&str>, obj: &Object, name: &str) -> Result<Object> {
        if !obj.has_finalizer(name) {
            return Ok(obj.clone());
        }
        let name = name.to_string();
        self.atomic_update(gvk, namespace, obj, move |o| o.remove_finalizer(&name)).await
    }
}

fn to_object(obj: DynamicObject) -> Result<Object> {
    Ok(Object::new(serde_json::to_value(obj)?))
}

fn from_object(obj: Object, ar: KubeApiResource) -> Result<DynamicObject> {
    let mut dyn_obj: DynamicObject = serde_json::from_value(obj.0)?;
    dyn_obj.types = Some(kube::api::TypeMeta {
        api_version: ar.api_version,
        kind: ar.kind,
    });
    Ok(dyn_obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_backoff_budget_is_bounded() {
        let b = conflict_backoff();
        assert_eq!(b.max_elapsed_time, Some(Duration::from_secs(2)));
        assert_eq!(MAX_CONFLICT_ATTEMPTS, 5);
    }
}
