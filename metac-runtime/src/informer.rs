//! §4.C — shared informer factory: one reference-counted, cached watch per
//! `(apiVersion, resource[, namespace])`, built on top of [`kube::runtime::watcher`] (the
//! "informer library" spec §1 treats as an external collaborator). `GetOrCreate` returns an
//! existing informer if present, `close` decrements and fully stops at zero.
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::Api;
use metac_core::{ApiResource, DiscoveryCache, GroupVersionKind, Object};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A fan-out event for one kind's informer. Deletes always carry the last-known object —
/// tombstone unwrapping (§4.G: "the delete event may carry `DeletedFinalStateUnknown`") is
/// done here, once, rather than by every consumer.
#[derive(Debug, Clone)]
pub enum InformerEvent {
    Add(Object),
    Update { old: Object, new: Object },
    Delete(Object),
}

struct Store {
    by_key: HashMap<String, Object>,
    synced: bool,
}

/// A handle to one running informer. Cheap to clone; all clones share the same background
/// task and cache.
#[derive(Clone)]
pub struct Informer {
    store: Arc<RwLock<Store>>,
    tx: async_broadcast::Sender<InformerEvent>,
    _rx_keepalive: async_broadcast::InactiveReceiver<InformerEvent>,
}

impl Informer {
    pub fn list(&self) -> Vec<Object> {
        self.store.read().by_key.values().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Object> {
        self.store.read().by_key.get(key).cloned()
    }

    pub fn has_synced(&self) -> bool {
        self.store.read().synced
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<InformerEvent> {
        self.tx.new_receiver()
    }
}

struct Entry {
    informer: Informer,
    refcount: usize,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Keyed by `(apiVersion, resource, namespace)` — `namespace = None` means cluster-wide /
/// all-namespaces watch, which is what every flavor in this engine actually uses (children
/// may live outside the parent's namespace for decorator/generic).
type InformerKey = (String, String, Option<String>);

#[derive(Clone)]
pub struct SharedInformerFactory {
    client: kube::Client,
    discovery: DiscoveryCache,
    entries: Arc<parking_lot::Mutex<HashMap<InformerKey, Entry>>>,
}

impl SharedInformerFactory {
    pub fn new(client: kube::Client, discovery: DiscoveryCache) -> Self {
        Self {
            client,
            discovery,
            entries: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// Returns an existing informer if present, else starts one. `resync` floors at 1s per
    /// §4.G ("optional custom resync period (floored at 1 s)").
    pub async fn get_or_create(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        resync: Option<Duration>,
    ) -> metac_core::Result<Informer> {
        let ar = self.discovery.get_by_gvk(gvk)?;
        let key = (gvk.api_version(), ar.resource.clone(), namespace.map(String::from));

        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&key) {
                entry.refcount += 1;
                return Ok(entry.informer.clone());
            }
        }

        let resync = resync.unwrap_or(Duration::from_secs(300)).max(Duration::from_secs(1));
        let informer = self.spawn(ar, namespace, resync, key.clone());

        let mut entries = self.entries.lock();
        // Another caller may have raced us; keep whichever won.
        let entry = entries.entry(key).or_insert_with(|| informer);
        entry.refcount += 1;
        Ok(entry.informer.clone())
    }

    fn spawn(&self, ar: ApiResource, namespace: Option<&str>, resync: Duration, key: InformerKey) -> Entry {
        let kube_ar = kube::api::ApiResource {
            group: ar.group.clone(),
            version: ar.version.clone(),
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
            plural: ar.resource.clone(),
        };
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &kube_ar),
            None => Api::all_with(self.client.clone(), &kube_ar),
        };

        let store = Arc::new(RwLock::new(Store {
            by_key: HashMap::new(),
            synced: false,
        }));
        let (mut tx, rx) = async_broadcast::broadcast(256);
        tx.set_await_active(false);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let bg_store = store.clone();
        let bg_tx = tx.clone();
        let task = tokio::spawn(async move {
            let cfg = watcher::Config::default().timeout((resync.as_secs() as u32).min(290));
            let mut stream = Box::pin(watcher::watcher(api, cfg));
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    next = stream.next() => {
                        match next {
                            None => return,
                            Some(Ok(ev)) => handle_event(&bg_store, &bg_tx, ev).await,
                            Some(Err(e)) => warn!(error = %e, %key.0, %key.1, "informer watch stream error, retrying"),
                        }
                    }
                }
            }
        });

        Entry {
            informer: Informer {
                store,
                tx,
                _rx_keepalive: rx.deactivate(),
            },
            refcount: 0,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Decrements the refcount; stops and removes the informer once it hits zero.
    pub async fn close(&self, gvk: &GroupVersionKind, namespace: Option<&str>) {
        let Ok(ar) = self.discovery.get_by_gvk(gvk) else { return };
        let key = (gvk.api_version(), ar.resource, namespace.map(String::from));
        let entry = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&key) else { return };
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount > 0 {
                return;
            }
            entries.remove(&key)
        };
        if let Some(mut entry) = entry {
            if let Some(tx) = entry.stop_tx.take() {
                let _ = tx.send(());
            }
            if let Some(task) = entry.task.take() {
                let _ = task.await;
            }
        }
    }
}

async fn handle_event(store: &Arc<RwLock<Store>>, tx: &async_broadcast::Sender<InformerEvent>, ev: WatchEvent<DynamicObject>) {
    match ev {
        WatchEvent::Init => {
            // start of a relist; nothing to emit yet.
        }
        WatchEvent::InitApply(obj) | WatchEvent::Apply(obj) => {
            let Ok(new) = serde_json::to_value(&obj).map(Object::new) else { return };
            let key = new.namespaced_key();
            let old = {
                let mut s = store.write();
                s.by_key.insert(key, new.clone())
            };
            match old {
                Some(old) if old.resource_version() == new.resource_version() => {
                    // identical resourceVersion: dropped (§4.G)
                }
                Some(old) => {
                    let _ = tx.broadcast_direct(InformerEvent::Update { old, new }).await;
                }
                None => {
                    let _ = tx.broadcast_direct(InformerEvent::Add(new)).await;
                }
            }
        }
        WatchEvent::InitDone => {
            store.write().synced = true;
            debug!("informer initial sync complete");
        }
        WatchEvent::Delete(obj) => {
            let Ok(gone) = serde_json::to_value(&obj).map(Object::new) else { return };
            let key = gone.namespaced_key();
            let removed = store.write().by_key.remove(&key);
            let final_state = removed.unwrap_or(gone); // tombstone: use last-known if we had it
            let _ = tx.broadcast_direct(InformerEvent::Delete(final_state)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn identical_resource_version_update_is_dropped() {
        let store = Arc::new(RwLock::new(Store {
            by_key: HashMap::new(),
            synced: true,
        }));
        let (mut tx, rx) = async_broadcast::broadcast(8);
        tx.set_await_active(false);
        let mut sub = tx.new_receiver();
        let _keepalive = rx.deactivate();

        let obj = |rv: &str| DynamicObject {
            types: None,
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("a".into()),
                resource_version: Some(rv.into()),
                ..Default::default()
            },
            data: json!({}),
        };

        handle_event(&store, &tx, WatchEvent::Apply(obj("1"))).await;
        let first = sub.recv().await.unwrap();
        assert!(matches!(first, InformerEvent::Add(_)));

        handle_event(&store, &tx, WatchEvent::Apply(obj("1"))).await;
        assert!(sub.try_recv().is_err(), "no event should be emitted for identical resourceVersion");

        handle_event(&store, &tx, WatchEvent::Apply(obj("2"))).await;
        let second = sub.recv().await.unwrap();
        assert!(matches!(second, InformerEvent::Update { .. }));
    }
}
