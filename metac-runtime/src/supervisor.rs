//! §4.H — the meta-supervisor: watches configuration objects (CRD instances or config-file
//! documents) and starts/stops/recreates a [`WatchController`] per configuration. Runs a
//! single worker, since controller lifecycle ops gain nothing from parallelism (§4.H: "no
//! benefit from parallelism for controller-lifecycle ops").
use crate::controller::{WatchController, WatchControllerConfig};
use crate::error::Result;
use crate::informer::{InformerEvent, SharedInformerFactory};
use crate::workqueue::WorkQueue;
use futures::future::join_all;
use metac_core::{DynamicClient, GroupVersionKind, Metrics, Object};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Where the supervisor gets configuration objects from: one GVK (CRD mode watches instances
/// of one flavor's CRD; config-file mode is handled by the caller synthesizing one configuration
/// object per document and feeding them in as if they were CRD instances — §4.H allows either).
pub struct SupervisorConfig {
    pub config_gvk: GroupVersionKind,
    pub config_namespace: Option<String>,
    pub resync: Option<Duration>,
}

struct Running {
    /// The configuration's own `spec` at the time this controller was last (re)built, used for
    /// the deep-equal no-op check on Update (§4.H).
    spec: Value,
    controller: Arc<WatchController>,
}

/// Builds a [`WatchControllerConfig`] from one configuration object. Boxed so the supervisor
/// stays agnostic to which of the three CRD kinds (or config-file schema) it's parsing.
pub type ConfigBuilder = Arc<dyn Fn(&Object) -> Result<WatchControllerConfig> + Send + Sync>;

pub struct MetaSupervisor {
    informers: SharedInformerFactory,
    client: DynamicClient,
    config: SupervisorConfig,
    build: ConfigBuilder,
    queue: WorkQueue,
    metrics: Arc<Metrics>,
    running: Arc<Mutex<HashMap<String, Running>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MetaSupervisor {
    pub async fn start(
        config: SupervisorConfig,
        client: DynamicClient,
        informers: SharedInformerFactory,
        build: ConfigBuilder,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>> {
        let config_informer = informers
            .get_or_create(&config.config_gvk, config.config_namespace.as_deref(), config.resync)
            .await?;
        while !config_informer.has_synced() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let this = Arc::new(Self {
            informers,
            client,
            config,
            build,
            queue: WorkQueue::new(),
            metrics,
            running: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        });

        let router = this.clone().spawn_router(config_informer);
        let worker = this.clone().spawn_worker();
        *this.tasks.lock().await = vec![router, worker];

        info!(kind = %this.config.config_gvk, "meta-supervisor started");
        Ok(this)
    }

    fn spawn_router(self: Arc<Self>, informer: crate::informer::Informer) -> JoinHandle<()> {
        let mut rx = informer.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(InformerEvent::Add(obj)) | Ok(InformerEvent::Update { new: obj, .. }) | Ok(InformerEvent::Delete(obj)) => {
                        self.queue.add(obj.namespaced_key());
                    }
                    Err(async_broadcast::RecvError::Closed) => return,
                    Err(async_broadcast::RecvError::Overflowed(_)) => continue,
                }
            }
        })
    }

    fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(key) = self.queue.get().await {
                if let Err(e) = self.reconcile_one(&key).await {
                    warn!(key = %key, error = %e, "meta-reconcile failed, requeuing with backoff");
                    self.queue.add_rate_limited(key.clone());
                    self.queue.done(&key);
                    continue;
                }
                self.queue.forget(&key);
                self.queue.done(&key);
            }
        })
    }

    async fn reconcile_one(&self, key: &str) -> Result<()> {
        let informer = self
            .informers
            .get_or_create(&self.config.config_gvk, self.config.config_namespace.as_deref(), self.config.resync)
            .await?;

        let Some(config_obj) = informer.get(key) else {
            // Delete: stop and forget.
            if let Some(running) = self.running.lock().await.remove(key) {
                running.controller.stop().await;
                info!(config = %key, "configuration deleted, controller stopped");
            }
            return Ok(());
        };

        let spec = config_obj.spec().cloned().unwrap_or(Value::Null);
        let mut running = self.running.lock().await;
        if let Some(existing) = running.get(key) {
            if spec_unchanged(&existing.spec, &spec) {
                return Ok(()); // semantically unchanged: no-op (§4.H)
            }
        }

        if let Some(old) = running.remove(key) {
            old.controller.stop().await;
        }

        let wc_config = (self.build)(&config_obj)?;
        let controller =
            WatchController::start(wc_config, self.client.clone(), self.informers.clone(), self.metrics.clone()).await?;
        info!(config = %key, "configuration (re)built, controller started");
        running.insert(key.to_string(), Running { spec, controller });
        Ok(())
    }

    /// §4.H shutdown: stop the supervisor's own queue, then stop every running controller
    /// concurrently and wait for all to finish.
    pub async fn stop(&self) {
        self.queue.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for t in tasks {
            t.abort();
        }
        let running = std::mem::take(&mut *self.running.lock().await);
        join_all(running.into_values().map(|r| async move { r.controller.stop().await })).await;
        info!("meta-supervisor stopped");
    }
}

/// Change detection for `spec` (§4.H "semantically unchanged"): plain `serde_json::Value`
/// equality, which is order-independent for objects, catching the common case of an apiserver
/// round-trip reordering map keys without actually changing anything.
fn spec_unchanged(old: &Value, new: &Value) -> bool {
    old == new
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reordered_object_keys_are_still_unchanged() {
        let old = json!({"a": 1, "b": {"x": "y", "z": 2}});
        let new = json!({"b": {"z": 2, "x": "y"}, "a": 1});
        assert!(spec_unchanged(&old, &new));
    }

    #[test]
    fn a_real_field_change_is_detected() {
        let old = json!({"a": 1});
        let new = json!({"a": 2});
        assert!(!spec_unchanged(&old, &new));
    }

    #[test]
    fn missing_spec_defaults_to_null_and_compares_equal_to_itself() {
        let a = Value::Null;
        let b = Value::Null;
        assert!(spec_unchanged(&a, &b));
    }
}
