//! §4.D — hook invoker: sends an encoded request to a configured endpoint and decodes its
//! response. The only implementation in scope is the HTTP+JSON webhook variant (§6).
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default hook timeout (§4.D): "10 s".
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServiceRef {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Configuration recognized by a `sync`/`finalize` hook entry (§4.D).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service: Option<ServiceRef>,
    #[serde(default)]
    pub path: Option<String>,
    /// Seconds; `None` means the default of 10s. Zero/negative are rejected at resolution time.
    #[serde(rename = "timeoutSeconds", default)]
    pub timeout_seconds: Option<i64>,
    #[serde(rename = "caBundle", default)]
    pub ca_bundle: Option<String>,
}

impl HookConfig {
    /// Resolves the final request URL: `url` overrides everything; otherwise
    /// `"<protocol>://<name>.<namespace>:<port><path>"` with `protocol=http`, `port=80`.
    pub fn resolve_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let svc = self
            .service
            .as_ref()
            .ok_or_else(|| Error::InvalidHookConfig("hook has neither url nor service configured".into()))?;
        let path = self.path.as_deref().unwrap_or("");
        let protocol = svc.protocol.as_deref().unwrap_or("http");
        let port = svc.port.unwrap_or(80);
        Ok(format!("{protocol}://{}.{}:{port}{path}", svc.name, svc.namespace))
    }

    pub fn timeout(&self) -> Result<Duration> {
        match self.timeout_seconds {
            None => Ok(DEFAULT_HOOK_TIMEOUT),
            Some(secs) if secs > 0 => Ok(Duration::from_secs(secs as u64)),
            Some(secs) => Err(Error::InvalidHookConfig(format!(
                "hook timeoutSeconds must be positive, got {secs}"
            ))),
        }
    }
}

/// The hook contract (§4.D): serialize a JSON request, POST it, decode a JSON response.
#[async_trait]
pub trait HookInvoker: Send + Sync {
    async fn call(&self, request: &Value) -> Result<Value>;
}

/// HTTP+JSON webhook invoker (§4.D, §6).
pub struct WebhookInvoker {
    client: reqwest::Client,
    config: HookConfig,
}

impl WebhookInvoker {
    pub fn new(config: HookConfig) -> Result<Self> {
        // Validate eagerly so misconfiguration surfaces at controller-start time (§7: "fatal
        // for that configuration"), not on the first reconcile.
        config.resolve_url()?;
        config.timeout()?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }
}

#[async_trait]
impl HookInvoker for WebhookInvoker {
    async fn call(&self, request: &Value) -> Result<Value> {
        let url = self.config.resolve_url()?;
        let timeout = self.config.timeout()?;

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    Error::HookTimeout {
                        url: url.clone(),
                        timeout_secs: timeout.as_secs(),
                    }
                } else {
                    Error::HookTransport { url: url.clone(), source }
                }
            })?;

        if resp.status().as_u16() != 200 {
            return Err(Error::HookStatusNot200 {
                url,
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| Error::HookTransport { url: url.clone(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| Error::HookDecode { url, source })
    }
}

/// Common hook request envelope (§6). Flavor-specific fields (`parent`/`object`/`watch`,
/// `children`/`attachments`) are merged into `extra` by the controller building the request,
/// since each flavor names its watched-object/children fields differently.
#[derive(Debug, Clone, Serialize)]
pub struct SyncHookRequest {
    pub controller: Value,
    pub finalizing: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncHookRequest {
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).expect("SyncHookRequest always serializes")
    }
}

/// Common hook response shape (§6). All fields are optional/defaulted since flavors use only
/// a subset (e.g. `labels`/`annotations`/`skipReconcile` are decorator/generic-only).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncHookResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub children: Vec<Value>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub labels: Map<String, Value>,
    #[serde(default)]
    pub annotations: Map<String, Value>,
    #[serde(rename = "resyncAfterSeconds", default)]
    pub resync_after_seconds: f64,
    #[serde(default)]
    pub finalized: bool,
    #[serde(rename = "skipReconcile", default)]
    pub skip_reconcile: bool,
    #[serde(rename = "explicitUpdates", default)]
    pub explicit_updates: Vec<Value>,
    #[serde(rename = "explicitDeletes", default)]
    pub explicit_deletes: Vec<Value>,
}

impl SyncHookResponse {
    /// `children` and `attachments` are the same concept under different names depending on
    /// flavor; callers should use whichever the wire format populated.
    pub fn desired_children(&self) -> &[Value] {
        if !self.children.is_empty() {
            &self.children
        } else {
            &self.attachments
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_override_wins() {
        let cfg = HookConfig {
            url: Some("http://example/hook".into()),
            service: Some(ServiceRef {
                name: "svc".into(),
                namespace: "ns".into(),
                port: Some(1234),
                protocol: Some("https".into()),
            }),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_url().unwrap(), "http://example/hook");
    }

    #[test]
    fn service_url_uses_defaults() {
        let cfg = HookConfig {
            service: Some(ServiceRef {
                name: "svc".into(),
                namespace: "ns".into(),
                port: None,
                protocol: None,
            }),
            path: Some("/sync".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_url().unwrap(), "http://svc.ns:80/sync");
    }

    #[test]
    fn neither_url_nor_service_is_invalid() {
        let cfg = HookConfig::default();
        assert!(cfg.resolve_url().is_err());
    }

    #[test]
    fn nonpositive_timeout_is_rejected() {
        let cfg = HookConfig {
            url: Some("http://x".into()),
            timeout_seconds: Some(0),
            ..Default::default()
        };
        assert!(cfg.timeout().is_err());
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        let cfg = HookConfig {
            url: Some("http://x".into()),
            ..Default::default()
        };
        assert_eq!(cfg.timeout().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn desired_children_prefers_children_field() {
        let mut resp = SyncHookResponse::default();
        resp.attachments = vec![Value::String("a".into())];
        assert_eq!(resp.desired_children(), &[Value::String("a".into())]);
        resp.children = vec![Value::String("c".into())];
        assert_eq!(resp.desired_children(), &[Value::String("c".into())]);
    }
}
