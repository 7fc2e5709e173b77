//! §4.G — the watch controller: the per-configuration reconciliation loop. One
//! implementation is shared across all three flavors (§9: "model as three implementations of
//! one `WatchController` contract... with shared helpers"); flavor differences are captured
//! in the [`Flavor`] enum and its small set of match arms inside [`WatchController::reconcile`].
pub mod composite;
pub mod decorator;
pub mod generic;

pub use composite::CompositeSpec;
pub use decorator::DecoratorSpec;
pub use generic::GenericSpec;

use crate::applier::{ApplyOptions, AttachmentApplier};
use crate::error::{Error, Result};
use crate::finalizer::FinalizerManager;
use crate::hook::{HookInvoker, SyncHookRequest, SyncHookResponse};
use crate::informer::{Informer, InformerEvent, SharedInformerFactory};
use crate::workqueue::WorkQueue;
use metac_core::{DynamicClient, GroupVersionKind, Metrics, Object, Registry};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// A label+annotation selector (§3: "label+annotation selector per resource"). Equality-style
/// `matchLabels`/`matchAnnotations` maps, matching the simplified selector model the rest of
/// this engine uses (no `matchExpressions`).
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub match_labels: BTreeMap<String, String>,
    pub match_annotations: BTreeMap<String, String>,
}

impl Selector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_annotations.is_empty()
    }

    pub fn matches(&self, obj: &Object) -> bool {
        let labels = obj.labels();
        let annos = obj.annotations();
        self.match_labels.iter().all(|(k, v)| labels.get(k) == Some(v))
            && self.match_annotations.iter().all(|(k, v)| annos.get(k) == Some(v))
    }
}

/// Which hooks a configuration wired up (§4.D, §6).
#[derive(Clone)]
pub struct HookSet {
    pub sync: Option<Arc<dyn HookInvoker>>,
    pub finalize: Option<Arc<dyn HookInvoker>>,
}

/// Flavor-specific behavior (§4.G "Composite/Decorator/Generic specifics").
#[derive(Clone)]
pub enum Flavor {
    Composite(CompositeSpec),
    Decorator(DecoratorSpec),
    Generic(GenericSpec),
}

impl Flavor {
    /// The per-configuration gate selector (§4.G "Gate: selector matches or finalizer
    /// present"). Composite has no such gate — every instance of the parent kind qualifies,
    /// and child ownership is instead governed by [`CompositeSpec::parent_selector`].
    fn gate_selector(&self) -> Selector {
        match self {
            Flavor::Composite(_) => Selector::default(),
            Flavor::Decorator(d) => d.selector.clone(),
            Flavor::Generic(g) => g.selector.clone(),
        }
    }

    fn is_watch_owner(&self) -> bool {
        match self {
            Flavor::Composite(_) => true,
            Flavor::Decorator(_) => false,
            Flavor::Generic(g) => g.is_watch_owner,
        }
    }

    /// The configuration CRD's kind name, used to build the deterministic finalizer name
    /// (§3: "`<domain>/<controller-kind>-<controller-name>`").
    fn kind_name(&self) -> &'static str {
        match self {
            Flavor::Composite(_) => "CompositeController",
            Flavor::Decorator(_) => "DecoratorController",
            Flavor::Generic(_) => "GenericController",
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            Flavor::Composite(_) => "composite",
            Flavor::Decorator(_) => "decorator",
            Flavor::Generic(_) => "generic",
        }
    }
}

/// Static configuration for one watch controller instance (one per configuration object,
/// built and owned by the meta-supervisor, §4.H).
#[derive(Clone)]
pub struct WatchControllerConfig {
    pub name: String,
    pub domain: String,
    /// The full configuration object (CRD instance or config-file document), sent verbatim
    /// as the hook request's `controller` field (§6).
    pub config_object: Value,
    pub parent_gvk: GroupVersionKind,
    pub parent_namespace: Option<String>,
    pub child_gvks: Vec<GroupVersionKind>,
    pub resync: Option<Duration>,
    pub worker_count: usize,
    pub finalizer_enabled: bool,
    pub hooks: HookSet,
    pub flavor: Flavor,
}

pub struct WatchController {
    config: WatchControllerConfig,
    client: DynamicClient,
    finalizer: FinalizerManager,
    applier: AttachmentApplier,
    queue: WorkQueue,
    parent_informer: Informer,
    child_informers: Vec<(GroupVersionKind, Informer)>,
    informers: SharedInformerFactory,
    metrics: Arc<Metrics>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WatchController {
    /// Builds informers, wires event routing, and spawns `worker_count` reconcile workers
    /// (§4.G "a worker pool of `workerCount`"). Blocks until the parent informer reports
    /// synced, matching §5's "controller start waits until informers report HasSynced".
    pub async fn start(
        config: WatchControllerConfig,
        client: DynamicClient,
        informers: SharedInformerFactory,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>> {
        let finalizer_name = FinalizerManager::name_for(&config.domain, config.flavor.kind_name(), &config.name);
        let finalizer = FinalizerManager::new(finalizer_name, config.finalizer_enabled);
        let applier = AttachmentApplier::new(client.clone());
        let queue = WorkQueue::new();

        let parent_informer = informers
            .get_or_create(&config.parent_gvk, config.parent_namespace.as_deref(), config.resync)
            .await?;
        let mut child_informers = Vec::new();
        for gvk in &config.child_gvks {
            let inf = informers.get_or_create(gvk, None, config.resync).await?;
            child_informers.push((gvk.clone(), inf));
        }

        while !parent_informer.has_synced() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let this = Arc::new(Self {
            config,
            client,
            finalizer,
            applier,
            queue,
            parent_informer,
            child_informers,
            informers,
            metrics,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();
        tasks.push(this.clone().spawn_parent_router());
        for (gvk, _) in this.child_informers.clone() {
            tasks.push(this.clone().spawn_child_router(gvk));
        }
        for _ in 0..this.config.worker_count.max(1) {
            tasks.push(this.clone().spawn_worker());
        }
        *this.tasks.lock().await = tasks;

        info!(controller = %this.config.name, "watch controller started");
        Ok(this)
    }

    /// §4.G shutdown: stop accepting work, drain workers, release informer references.
    pub async fn stop(&self) {
        self.queue.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for t in tasks {
            t.abort();
        }
        self.informers
            .close(&self.config.parent_gvk, self.config.parent_namespace.as_deref())
            .await;
        for (gvk, _) in &self.child_informers {
            self.informers.close(gvk, None).await;
        }
        info!(controller = %self.config.name, "watch controller stopped");
    }

    fn key_of(&self, watch: &Object) -> String {
        key_of(&self.config.flavor, watch)
    }

    fn lookup_key(&self, key: &str) -> String {
        lookup_key(&self.config.flavor, key)
    }

    fn spawn_parent_router(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.parent_informer.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(InformerEvent::Add(obj)) | Ok(InformerEvent::Update { new: obj, .. }) | Ok(InformerEvent::Delete(obj)) => {
                        if self.config.flavor.gate_selector().matches(&obj) || obj.has_finalizer(&self.finalizer.name) {
                            self.queue.add(self.key_of(&obj));
                        }
                    }
                    Err(async_broadcast::RecvError::Closed) => return,
                    Err(async_broadcast::RecvError::Overflowed(_)) => continue,
                }
            }
        })
    }

    fn spawn_child_router(self: Arc<Self>, gvk: GroupVersionKind) -> JoinHandle<()> {
        let Some((_, informer)) = self.child_informers.iter().find(|(g, _)| g == &gvk).cloned() else {
            return tokio::spawn(async {});
        };
        let mut rx = informer.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(InformerEvent::Add(child)) | Ok(InformerEvent::Update { new: child, .. }) | Ok(InformerEvent::Delete(child)) => {
                        self.route_child_event(&child);
                    }
                    Err(async_broadcast::RecvError::Closed) => return,
                    Err(async_broadcast::RecvError::Overflowed(_)) => continue,
                }
            }
        })
    }

    /// Resolves the child's controlling owner (by UID, against the cached parent list); for
    /// composite, unowned children are matched against every current parent by label selector
    /// (orphan adoption). Decorator/generic never adopt orphans (§4.G Event routing).
    fn route_child_event(&self, child: &Object) {
        if let Some(owner) = child.controller_ref() {
            for parent in self.parent_informer.list() {
                if parent.uid() == owner.uid {
                    self.queue.add(self.key_of(&parent));
                    return;
                }
            }
            return;
        }
        if let Flavor::Composite(c) = &self.config.flavor {
            for parent in self.parent_informer.list() {
                if c.parent_selector(&parent).matches(child) {
                    self.queue.add(self.key_of(&parent));
                }
            }
        }
    }

    fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let flavor = self.config.flavor.metric_label();
            while let Some(key) = self.queue.get().await {
                let started = Instant::now();
                let result = self.reconcile(&key).await;
                self.metrics
                    .reconcile_duration_seconds
                    .with_label_values(&[flavor, &self.config.name])
                    .observe(started.elapsed().as_secs_f64());

                let outcome = match &result {
                    Ok(_) => "success",
                    Err(_) => "failure",
                };
                self.metrics
                    .reconciles_total
                    .with_label_values(&[flavor, &self.config.name, outcome])
                    .inc();

                match result {
                    Ok(Some(delay)) => {
                        self.queue.forget(&key);
                        self.queue.add_after(key.clone(), delay);
                    }
                    Ok(None) => self.queue.forget(&key),
                    Err(e) => {
                        warn!(key = %key, error = %e, "reconcile failed, requeuing with backoff");
                        self.queue.add_rate_limited(key.clone());
                    }
                }
                self.queue.done(&key);
                self.metrics.workqueue_depth.with_label_values(&[&self.config.name]).set(self.queue.len() as i64);
            }
        })
    }

    /// The common reconcile skeleton (§4.G "Reconcile (sync)"). Returns `Ok(Some(delay))` when
    /// the hook asked for a resync, `Ok(None)` on ordinary completion/ack, `Err` to retry.
    #[instrument(skip(self), fields(controller = %self.config.name, key = %key))]
    async fn reconcile(&self, key: &str) -> Result<Option<Duration>> {
        let lookup = self.lookup_key(key);
        let Some(mut watch) = self.parent_informer.get(&lookup) else {
            return Ok(None); // NotFound: ack and return (§7)
        };

        let selector = self.config.flavor.gate_selector();
        if !(selector.matches(&watch) || watch.has_finalizer(&self.finalizer.name)) {
            return Ok(None); // gate: neither selector nor finalizer
        }

        watch = self
            .finalizer
            .sync_object(&self.client, &self.config.parent_gvk, watch.namespace(), &watch)
            .await?;
        if !(selector.matches(&watch) || watch.has_finalizer(&self.finalizer.name)) {
            return Ok(None); // re-check after finalizer mutation
        }

        let observed = self.observe_children(&watch);

        let finalizing = watch.is_pending_deletion() || !selector.matches(&watch);
        let hook = if finalizing { &self.config.hooks.finalize } else { &self.config.hooks.sync };
        let Some(hook) = hook else {
            return Ok(None); // only finalize configured, not yet finalizing: no call to make
        };

        let hook_kind = if finalizing { "finalize" } else { "sync" };
        let request = self.build_request(&watch, &observed, finalizing);
        let started = Instant::now();
        let call_result = hook.call(&request).await;
        self.metrics
            .hook_duration_seconds
            .with_label_values(&[&self.config.name, hook_kind])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .hook_calls_total
            .with_label_values(&[&self.config.name, hook_kind, if call_result.is_ok() { "success" } else { "failure" }])
            .inc();
        let response: SyncHookResponse =
            serde_json::from_value(call_result?).map_err(|e| Error::Core(metac_core::Error::Serde(e)))?;

        self.apply_parent_mutations(&mut watch, &response).await?;

        let should_reconcile_attachments = !watch.is_pending_deletion()
            || self.finalizer.should_finalize(&watch)
            || (finalizing && !response.finalized);
        if !response.skip_reconcile && should_reconcile_attachments {
            self.apply_children(&watch, &observed, &response).await?;
        }

        if response.resync_after_seconds > 0.0 {
            return Ok(Some(Duration::from_secs_f64(response.resync_after_seconds)));
        }
        Ok(None)
    }

    fn observe_children(&self, watch: &Object) -> Registry {
        let mut observed = Registry::new();
        let anno_key = format!("{}/created-due-to-watch", self.config.domain);
        let decorator_key = format!("{}/decorator-controller", self.config.domain);
        for (gvk, informer) in &self.child_informers {
            observed.declare_kind(gvk);
            for child in informer.list() {
                let provenance_matches = match &self.config.flavor {
                    // Decorator children never get an owner reference (`is_watch_owner` is
                    // always false for this flavor, §4.G), so provenance is annotation-only:
                    // `created-due-to-watch` ties the child to this watch, `decorator-controller`
                    // disambiguates from other decorators of the same parent kind (§3).
                    Flavor::Decorator(d) => {
                        child.annotation(&anno_key).as_deref() == Some(watch.uid())
                            && child.annotation(&decorator_key).as_deref() == Some(d.name.as_str())
                    }
                    _ => {
                        child.annotation(&anno_key).as_deref() == Some(watch.uid())
                            || child.controller_ref().map(|o| o.uid).as_deref() == Some(watch.uid())
                    }
                };
                if provenance_matches {
                    observed.insert_object(child);
                }
            }
        }
        observed
    }

    fn build_request(&self, watch: &Object, observed: &Registry, finalizing: bool) -> Value {
        let controller = self.config.config_object.clone();
        let mut extra = Map::new();
        let watch_key = match &self.config.flavor {
            Flavor::Composite(_) => "parent",
            Flavor::Decorator(_) => "object",
            Flavor::Generic(_) => "watch",
        };
        extra.insert(watch_key.to_string(), watch.0.clone());
        let children_key = match &self.config.flavor {
            Flavor::Composite(_) => "children",
            _ => "attachments",
        };
        extra.insert(children_key.to_string(), registry_to_value(observed));

        SyncHookRequest { controller, finalizing, extra }.into_value()
    }

    async fn apply_parent_mutations(&self, watch: &mut Object, response: &SyncHookResponse) -> Result<()> {
        match &self.config.flavor {
            Flavor::Composite(_) => {
                if let Some(status) = &response.status {
                    let mut desired_status = status.clone();
                    if let Value::Object(m) = &mut desired_status {
                        m.insert("observedGeneration".to_string(), Value::from(watch.generation()));
                    }
                    if watch.status() != Some(&desired_status) {
                        let updated = self
                            .client
                            .atomic_status_update(&self.config.parent_gvk, watch.namespace(), watch, |o| {
                                o.set_status(desired_status.clone())
                            })
                            .await?;
                        *watch = updated;
                    }
                }
            }
            Flavor::Decorator(_) | Flavor::Generic(_) => {
                let ns = watch.namespace().map(String::from);
                // §4.G step 6: status subresource first, then spec/meta — a main-resource
                // PUT silently drops status when the kind has a status subresource.
                if let Some(status) = response.status.clone() {
                    if watch.status() != Some(&status) {
                        let updated = self
                            .client
                            .atomic_status_update(&self.config.parent_gvk, ns.as_deref(), watch, move |o| {
                                o.set_status(status.clone())
                            })
                            .await?;
                        *watch = updated;
                    }
                }
                let labels = response.labels.clone();
                let annos = response.annotations.clone();
                if !labels.is_empty() || !annos.is_empty() {
                    let updated = self
                        .client
                        .atomic_update(&self.config.parent_gvk, ns.as_deref(), watch, move |o| {
                            apply_patch(o, PatchKind::Label, &labels);
                            apply_patch(o, PatchKind::Annotation, &annos);
                        })
                        .await?;
                    *watch = updated;
                }
            }
        }
        if response.finalized {
            let updated = self
                .client
                .remove_finalizer(&self.config.parent_gvk, watch.namespace(), watch, &self.finalizer.name)
                .await?;
            *watch = updated;
        }
        Ok(())
    }

    async fn apply_children(&self, watch: &Object, observed: &Registry, response: &SyncHookResponse) -> Result<()> {
        let mut desired = Registry::new();
        for gvk in &self.config.child_gvks {
            desired.declare_kind(gvk);
        }
        for value in response.desired_children() {
            let mut obj = Object::new(value.clone());
            if let Flavor::Composite(c) = &self.config.flavor {
                if c.generate_selector {
                    obj.set_label("controller-uid", watch.uid());
                }
            }
            let gvk = GroupVersionKind::from_api_version_kind(obj.api_version(), obj.kind());
            desired.insert(gvk, obj.namespaced_key(), obj);
        }

        let opts = match &self.config.flavor {
            Flavor::Composite(c) => ApplyOptions {
                domain: self.config.domain.clone(),
                is_watch_owner: self.config.flavor.is_watch_owner(),
                update_any: false,
                delete_any: false,
                update_during_pending_delete: false,
                decorator_controller_name: None,
                selector_labels: Some(c.parent_selector(watch).match_labels.clone()),
                stamp_updated_annotation: false,
                strategies: c.strategies.clone(),
                force_update: Default::default(),
                force_delete: Default::default(),
            },
            Flavor::Decorator(d) => ApplyOptions {
                domain: self.config.domain.clone(),
                is_watch_owner: self.config.flavor.is_watch_owner(),
                update_any: false,
                delete_any: false,
                update_during_pending_delete: false,
                decorator_controller_name: Some(d.name.clone()),
                selector_labels: None,
                stamp_updated_annotation: false,
                strategies: d.strategies.clone(),
                force_update: Default::default(),
                force_delete: Default::default(),
            },
            Flavor::Generic(g) => ApplyOptions {
                domain: self.config.domain.clone(),
                is_watch_owner: g.is_watch_owner,
                update_any: g.update_any,
                delete_any: g.delete_any,
                update_during_pending_delete: false,
                decorator_controller_name: None,
                selector_labels: None,
                stamp_updated_annotation: true,
                strategies: g.strategies.clone(),
                force_update: explicit_keys(&response.explicit_updates),
                force_delete: explicit_keys(&response.explicit_deletes),
            },
        };

        if matches!(&self.config.flavor, Flavor::Generic(g) if g.read_only) {
            return Ok(());
        }
        self.applier.apply(watch, observed, &desired, &opts).await
    }
}

/// Generic watches more than one kind per process (the same queue/workers serve every
/// `GenericController`), so its workqueue key must disambiguate by `(apiVersion, kind)` in
/// addition to `namespace/name`; composite/decorator each own exactly one parent kind, so the
/// plain namespaced key is enough (§4.G "Event routing").
fn key_of(flavor: &Flavor, watch: &Object) -> String {
    match flavor {
        Flavor::Generic(_) => format!("{}:{}:{}", watch.api_version(), watch.kind(), watch.namespaced_key()),
        _ => watch.namespaced_key(),
    }
}

fn lookup_key(flavor: &Flavor, key: &str) -> String {
    match flavor {
        Flavor::Generic(_) => key.splitn(3, ':').nth(2).unwrap_or(key).to_string(),
        _ => key.to_string(),
    }
}

/// Turns a generic hook's `explicitUpdates`/`explicitDeletes` entries (bare objects naming
/// `kind`/`metadata.name[/namespace]`) into `"<kind>/<namespacedKey>"` strings matching
/// [`crate::applier::ApplyOptions`]'s force-key format.
fn explicit_keys(values: &[Value]) -> std::collections::HashSet<String> {
    values
        .iter()
        .map(|v| Object::new(v.clone()))
        .map(|o| format!("{}/{}", o.kind(), o.namespaced_key()))
        .collect()
}

fn registry_to_value(reg: &Registry) -> Value {
    let mut by_kind = Map::new();
    for gvk in reg.kinds() {
        let Some(bucket) = reg.bucket(&gvk) else { continue };
        let mut by_name = Map::new();
        for (key, obj) in bucket {
            by_name.insert(key.clone(), obj.0.clone());
        }
        by_kind.insert(gvk.kind.clone(), Value::Object(by_name));
    }
    Value::Object(by_kind)
}

enum PatchKind {
    Label,
    Annotation,
}

/// Merges a `labels`/`annotations` response map into `obj` (§4.G step 6: "null ⇒ delete key").
fn apply_patch(obj: &mut Object, kind: PatchKind, patch: &Map<String, Value>) {
    for (k, v) in patch {
        match (v, &kind) {
            (Value::Null, PatchKind::Label) => obj.remove_label(k),
            (Value::Null, PatchKind::Annotation) => obj.remove_annotation(k),
            (other, PatchKind::Label) => obj.set_label(k, other.as_str().unwrap_or_default()),
            (other, PatchKind::Annotation) => obj.set_annotation(k, other.as_str().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Object {
        Object::new(v)
    }

    #[test]
    fn selector_matches_requires_every_configured_label_and_annotation() {
        let sel = Selector {
            match_labels: BTreeMap::from([("app".to_string(), "x".to_string())]),
            match_annotations: BTreeMap::from([("team".to_string(), "y".to_string())]),
        };
        let matching = obj(json!({
            "metadata": {"labels": {"app": "x"}, "annotations": {"team": "y"}}
        }));
        let wrong_label = obj(json!({
            "metadata": {"labels": {"app": "other"}, "annotations": {"team": "y"}}
        }));
        let missing_annotation = obj(json!({"metadata": {"labels": {"app": "x"}}}));
        assert!(sel.matches(&matching));
        assert!(!sel.matches(&wrong_label));
        assert!(!sel.matches(&missing_annotation));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(Selector::default().matches(&obj(json!({"metadata": {}}))));
    }

    #[test]
    fn generic_keys_disambiguate_by_gvk_composite_and_decorator_do_not() {
        let watch = obj(json!({
            "apiVersion": "examples.io/v1",
            "kind": "Widget",
            "metadata": {"name": "w1", "namespace": "ns"},
        }));
        let generic = Flavor::Generic(GenericSpec::default());
        let composite = Flavor::Composite(CompositeSpec::default());
        let generic_key = key_of(&generic, &watch);
        assert_eq!(generic_key, "examples.io/v1:Widget:ns/w1");
        assert_eq!(lookup_key(&generic, &generic_key), "ns/w1");
        assert_eq!(key_of(&composite, &watch), "ns/w1");
        assert_eq!(lookup_key(&composite, "ns/w1"), "ns/w1");
    }

    #[test]
    fn explicit_keys_formats_kind_and_namespaced_key() {
        let values = vec![json!({
            "kind": "ConfigMap",
            "metadata": {"name": "cm1", "namespace": "ns"},
        })];
        let keys = explicit_keys(&values);
        assert!(keys.contains("ConfigMap/ns/cm1"));
    }

    #[test]
    fn registry_to_value_groups_buckets_by_kind() {
        let mut reg = Registry::new();
        let gvk = GroupVersionKind { group: "".to_string(), version: "v1".to_string(), kind: "ConfigMap".to_string() };
        reg.insert(gvk.clone(), "ns/cm1".to_string(), obj(json!({"kind": "ConfigMap"})));
        let value = registry_to_value(&reg);
        assert!(value.get("ConfigMap").and_then(|v| v.get("ns/cm1")).is_some());
    }

    #[test]
    fn apply_patch_null_removes_label_and_nonnull_sets_it() {
        let mut o = obj(json!({"metadata": {"labels": {"keep": "1", "drop": "1"}}}));
        let patch = Map::from_iter([
            ("drop".to_string(), Value::Null),
            ("added".to_string(), Value::String("v".to_string())),
        ]);
        apply_patch(&mut o, PatchKind::Label, &patch);
        let labels = o.labels();
        assert_eq!(labels.get("keep"), Some(&"1".to_string()));
        assert_eq!(labels.get("added"), Some(&"v".to_string()));
        assert!(!labels.contains_key("drop"));
    }
}
