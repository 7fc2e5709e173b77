//! The three configuration object kinds (§3, §6): `CompositeController`, `DecoratorController`,
//! `GenericController`. Each carries a `spec` matching §3's field table and deserializes either
//! from a CRD instance fetched as a [`metac_core::Object`] or from a YAML document loaded from
//! `--metac-config-path` (`--run-as-local`, §6).
use anyhow::{bail, Context, Result};
use metac_core::{GroupVersionKind, Object};
use metac_runtime::{
    CompositeSpec, DecoratorSpec, Flavor, GenericSpec, HookConfig, HookSet, Selector, UpdateStrategy,
    WatchControllerConfig, WebhookInvoker,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// `group/version` + `kind` as it appears in a `watch`/`parentResource`/`resources` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ResourceRef {
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind(&self.api_version, &self.kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorSpec {
    #[serde(rename = "labelSelector", default)]
    pub label_selector: HashMap<String, String>,
    #[serde(rename = "annotationSelector", default)]
    pub annotation_selector: HashMap<String, String>,
}

impl SelectorSpec {
    fn into_selector(self) -> Selector {
        Selector {
            match_labels: self.label_selector.into_iter().collect(),
            match_annotations: self.annotation_selector.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookSpec {
    #[serde(default)]
    pub sync: Option<HookConfig>,
    #[serde(default)]
    pub finalize: Option<HookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildResourceSpec {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(rename = "updateStrategy", default)]
    pub update_strategy: String,
}

fn strategies_of(children: &[ChildResourceSpec]) -> Result<HashMap<(String, String), UpdateStrategy>> {
    let mut out = HashMap::new();
    for c in children {
        let gvk = GroupVersionKind::from_api_version_kind(&c.api_version, &c.kind);
        let strategy = UpdateStrategy::parse(&c.update_strategy)
            .with_context(|| format!("child resource {}/{}", c.api_version, c.kind))?;
        out.insert((gvk.group, gvk.kind), strategy);
    }
    Ok(out)
}

fn child_gvks(children: &[ChildResourceSpec]) -> Vec<GroupVersionKind> {
    children
        .iter()
        .map(|c| GroupVersionKind::from_api_version_kind(&c.api_version, &c.kind))
        .collect()
}

fn resolve_resync(seconds: Option<f64>) -> Option<Duration> {
    seconds.map(|s| Duration::from_secs_f64(s.max(1.0)))
}

/// §3: generic ownership "default true", unlike `updateAny`/`deleteAny`/`readOnly`.
fn default_true() -> bool {
    true
}

fn hook_set(hooks: &HookSpec) -> Result<HookSet> {
    let sync = hooks
        .sync
        .as_ref()
        .map(|h| WebhookInvoker::new(h.clone()).map(|w| Arc::new(w) as Arc<dyn metac_runtime::HookInvoker>))
        .transpose()?;
    let finalize = hooks
        .finalize
        .as_ref()
        .map(|h| WebhookInvoker::new(h.clone()).map(|w| Arc::new(w) as Arc<dyn metac_runtime::HookInvoker>))
        .transpose()?;
    Ok(HookSet { sync, finalize })
}

// --- CompositeController ---

#[derive(Debug, Clone, Deserialize)]
pub struct CompositeControllerSpec {
    #[serde(rename = "parentResource")]
    pub parent_resource: ResourceRef,
    #[serde(rename = "childResources", default)]
    pub child_resources: Vec<ChildResourceSpec>,
    #[serde(rename = "generateSelector", default)]
    pub generate_selector: bool,
    pub hooks: HookSpec,
    #[serde(rename = "resyncPeriodSeconds", default)]
    pub resync_period_seconds: Option<f64>,
}

// --- DecoratorController ---

#[derive(Debug, Clone, Deserialize)]
pub struct DecoratorControllerSpec {
    pub resources: Vec<ResourceRef>,
    #[serde(default)]
    pub selector: SelectorSpec,
    #[serde(default)]
    pub attachments: Vec<ChildResourceSpec>,
    pub hooks: HookSpec,
    #[serde(rename = "resyncPeriodSeconds", default)]
    pub resync_period_seconds: Option<f64>,
}

// --- GenericController ---

#[derive(Debug, Clone, Deserialize)]
pub struct GenericControllerSpec {
    pub watch: ResourceRef,
    #[serde(default)]
    pub selector: SelectorSpec,
    #[serde(default)]
    pub attachments: Vec<ChildResourceSpec>,
    #[serde(rename = "isWatchOwner", default = "default_true")]
    pub is_watch_owner: bool,
    #[serde(rename = "updateAny", default)]
    pub update_any: bool,
    #[serde(rename = "deleteAny", default)]
    pub delete_any: bool,
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
    pub hooks: HookSpec,
    #[serde(rename = "resyncPeriodSeconds", default)]
    pub resync_period_seconds: Option<f64>,
}

/// Which of the three configuration kinds a `Config` holds, used to pick the right builder
/// when the supervisor asks us to turn an [`Object`] into a [`WatchControllerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Composite,
    Decorator,
    Generic,
}

impl ConfigKind {
    pub fn gvk(self, group: &str) -> GroupVersionKind {
        let kind = match self {
            ConfigKind::Composite => "CompositeController",
            ConfigKind::Decorator => "DecoratorController",
            ConfigKind::Generic => "GenericController",
        };
        GroupVersionKind { group: group.to_string(), version: "v1".to_string(), kind: kind.to_string() }
    }
}

/// Parses `object`'s `spec` into the strongly-typed flavor spec named by `kind`, and builds a
/// [`WatchControllerConfig`] — the closure the meta-supervisor (§4.H) calls per configuration
/// change. `domain` and `worker_count` come from CLI flags (§6), shared across every
/// configuration this process supervises.
pub fn build_watch_controller_config(
    kind: ConfigKind,
    domain: &str,
    worker_count: usize,
    object: &Object,
) -> Result<WatchControllerConfig> {
    let name = object.name().to_string();
    let spec_value = object
        .spec()
        .cloned()
        .with_context(|| format!("configuration {name} has no spec"))?;

    match kind {
        ConfigKind::Composite => {
            let spec: CompositeControllerSpec =
                serde_json::from_value(spec_value).with_context(|| format!("parsing CompositeController {name}"))?;
            let composite = CompositeSpec {
                generate_selector: spec.generate_selector,
                strategies: strategies_of(&spec.child_resources)?,
            };
            Ok(WatchControllerConfig {
                name,
                domain: domain.to_string(),
                config_object: object.0.clone(),
                parent_gvk: spec.parent_resource.gvk(),
                parent_namespace: spec.parent_resource.namespace.clone(),
                child_gvks: child_gvks(&spec.child_resources),
                resync: resolve_resync(spec.resync_period_seconds),
                worker_count,
                finalizer_enabled: spec.hooks.finalize.is_some(),
                hooks: hook_set(&spec.hooks)?,
                flavor: Flavor::Composite(composite),
            })
        }
        ConfigKind::Decorator => {
            let spec: DecoratorControllerSpec =
                serde_json::from_value(spec_value).with_context(|| format!("parsing DecoratorController {name}"))?;
            let Some(parent) = spec.resources.first() else {
                bail!("DecoratorController {name} declares no resources");
            };
            let decorator = DecoratorSpec {
                name: name.clone(),
                selector: spec.selector.clone().into_selector(),
                strategies: strategies_of(&spec.attachments)?,
            };
            Ok(WatchControllerConfig {
                name,
                domain: domain.to_string(),
                config_object: object.0.clone(),
                parent_gvk: parent.gvk(),
                parent_namespace: parent.namespace.clone(),
                child_gvks: child_gvks(&spec.attachments),
                resync: resolve_resync(spec.resync_period_seconds),
                worker_count,
                finalizer_enabled: spec.hooks.finalize.is_some(),
                hooks: hook_set(&spec.hooks)?,
                flavor: Flavor::Decorator(decorator),
            })
        }
        ConfigKind::Generic => {
            let spec: GenericControllerSpec =
                serde_json::from_value(spec_value).with_context(|| format!("parsing GenericController {name}"))?;
            let generic = GenericSpec {
                selector: spec.selector.clone().into_selector(),
                is_watch_owner: spec.is_watch_owner,
                update_any: spec.update_any,
                delete_any: spec.delete_any,
                read_only: spec.read_only,
                strategies: strategies_of(&spec.attachments)?,
            };
            Ok(WatchControllerConfig {
                name,
                domain: domain.to_string(),
                config_object: object.0.clone(),
                parent_gvk: spec.watch.gvk(),
                parent_namespace: spec.watch.namespace.clone(),
                child_gvks: child_gvks(&spec.attachments),
                resync: resolve_resync(spec.resync_period_seconds),
                worker_count,
                finalizer_enabled: spec.hooks.finalize.is_some(),
                hooks: hook_set(&spec.hooks)?,
                flavor: Flavor::Generic(generic),
            })
        }
    }
}

/// `--run-as-local` (§6): one configuration object per YAML document under
/// `--metac-config-path`, read as if it had come from a CRD watch. Each document must carry
/// `apiVersion`/`kind`/`metadata.name` like a real CRD instance so the rest of the pipeline
/// (builder, provenance, finalizer naming) doesn't need a local-mode special case.
pub fn load_local_configs(dir: &Path) -> Result<Vec<(ConfigKind, Object)>> {
    let mut out = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading --metac-config-path {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        if ext != "yaml" && ext != "yml" {
            continue;
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        for doc in serde_yaml::Deserializer::from_str(&text) {
            let value = serde_json::Value::deserialize(doc)
                .with_context(|| format!("parsing YAML document in {}", path.display()))?;
            if value.is_null() {
                continue;
            }
            let kind = match value.get("kind").and_then(|k| k.as_str()) {
                Some("CompositeController") => ConfigKind::Composite,
                Some("DecoratorController") => ConfigKind::Decorator,
                Some("GenericController") => ConfigKind::Generic,
                Some(other) => bail!("{}: unrecognized configuration kind {other}", path.display()),
                None => bail!("{}: document has no kind", path.display()),
            };
            out.push((kind, Object::new(value)));
        }
    }
    Ok(out)
}
