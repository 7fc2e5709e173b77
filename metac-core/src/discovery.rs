//! §4.A — the discovery cache: a background task that periodically refreshes the
//! apiserver's `(group, version, resource)` catalogue and answers `(apiVersion, kind)` /
//! `(apiVersion, resource)` lookups from an in-memory, read-mostly snapshot.
use crate::error::{DiscoveryError, Error, Result};
use crate::metrics::Metrics;
use crate::resource::{ApiResource as MetacApiResource, GroupVersionKind, GroupVersionResource};
use kube::discovery::verbs;
use kube::Client;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default `--discovery-interval` (§6).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Snapshot {
    by_gvk: HashMap<(String, String), MetacApiResource>,
    by_gvr: HashMap<(String, String), MetacApiResource>,
    synced: bool,
}

/// Singleton-style handle: `start` spawns the refresh loop, `stop` tears it down. Readers
/// clone this handle freely — the snapshot lives behind an `Arc<RwLock<_>>` so refreshes
/// replace the whole map under a single write-lock acquisition (§5's "shared resources").
#[derive(Clone)]
pub struct DiscoveryCache {
    client: Client,
    snapshot: Arc<RwLock<Snapshot>>,
    metrics: Arc<Metrics>,
}

pub struct DiscoveryCacheHandle {
    pub cache: DiscoveryCache,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryCache {
    /// Starts the background refresh loop. The first refresh runs synchronously so that
    /// callers observe a synced cache as soon as `start` returns successfully (§4.A: "fails
    /// with DiscoveryNotSynced if queried before first refresh completes").
    pub async fn start(client: Client, refresh_interval: Duration, metrics: Arc<Metrics>) -> Result<DiscoveryCacheHandle> {
        let cache = DiscoveryCache {
            client,
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            metrics,
        };
        cache.refresh_once().await?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let bg = cache.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.tick().await; // first tick fires immediately; we already refreshed above
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = interval.tick() => {
                        if let Err(e) = bg.refresh_once().await {
                            warn!(error = %e, "discovery refresh failed; retaining last snapshot");
                        } else {
                            debug!("discovery cache refreshed");
                        }
                    }
                }
            }
        });

        Ok(DiscoveryCacheHandle {
            cache,
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }

    async fn refresh_once(&self) -> Result<()> {
        let discovery = match kube::discovery::Discovery::new(self.client.clone()).run().await {
            Ok(d) => d,
            Err(e) => {
                self.metrics.discovery_refresh_total.with_label_values(&["failure"]).inc();
                return Err(DiscoveryError::Request(e).into());
            }
        };

        let mut by_gvk = HashMap::new();
        let mut by_gvr = HashMap::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if ar.plural.contains('/') {
                    // top-level discovery never yields these for recommended_resources, but
                    // guard anyway: fold "parent/sub" onto the parent's subresource set.
                    continue;
                }
                let mut mine = MetacApiResource::new(&ar.group, &ar.version, &ar.kind, &ar.plural, ar.namespaced);
                mine.subresources = ar
                    .subresources
                    .iter()
                    .filter_map(|s| s.plural.rsplit('/').next().map(str::to_string))
                    .collect();
                let _ = caps.supports_operation(verbs::LIST); // discovery reachability check
                by_gvk.insert((mine.api_version.clone(), mine.kind.clone()), mine.clone());
                by_gvr.insert((mine.api_version.clone(), mine.resource.clone()), mine);
            }
        }

        let mut snap = self.snapshot.write();
        snap.by_gvk = by_gvk;
        snap.by_gvr = by_gvr;
        snap.synced = true;
        drop(snap);

        self.metrics.discovery_refresh_total.with_label_values(&["success"]).inc();
        self.metrics.discovery_last_refresh_age_seconds.with_label_values(&["default"]).set(0);
        Ok(())
    }

    pub fn has_synced(&self) -> bool {
        self.snapshot.read().synced
    }

    pub fn get_by_gvk(&self, gvk: &GroupVersionKind) -> Result<MetacApiResource> {
        let snap = self.snapshot.read();
        if !snap.synced {
            return Err(Error::DiscoveryNotSynced);
        }
        snap.by_gvk
            .get(&(gvk.api_version(), gvk.kind.clone()))
            .cloned()
            .ok_or_else(|| Error::DiscoveryNotFound(gvk.to_string()))
    }

    pub fn get_by_gvr(&self, gvr: &GroupVersionResource) -> Result<MetacApiResource> {
        let snap = self.snapshot.read();
        if !snap.synced {
            return Err(Error::DiscoveryNotSynced);
        }
        snap.by_gvr
            .get(&(gvr.api_version(), gvr.resource.clone()))
            .cloned()
            .ok_or_else(|| Error::DiscoveryNotFound(gvr.to_string()))
    }
}

impl DiscoveryCacheHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsynced_cache_rejects_lookups() {
        let snap = Snapshot::default();
        assert!(!snap.synced);
    }

    #[test]
    fn default_refresh_interval_matches_spec() {
        assert_eq!(DEFAULT_REFRESH_INTERVAL, Duration::from_secs(30));
    }
}
