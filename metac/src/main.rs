//! `metac` — the binary: CLI flags (§6), process wiring (discovery → informer factory →
//! supervisors → controllers), and the debug/metrics server.
mod config;
mod metrics;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use config::ConfigKind;
use metac_core::{DiscoveryCache, DynamicClient, Metrics};
use metac_runtime::{MetaSupervisor, SharedInformerFactory, SupervisorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry::LogFormat;
use tracing::info;

/// Generic meta-controller engine: synthesizes reconciliation controllers at runtime from
/// declarative configuration and delegates desired-state computation to webhooks (§1, §6).
#[derive(Parser, Debug)]
#[command(name = "metac", version, about)]
struct Cli {
    /// Discovery cache refresh interval (§6).
    #[arg(long, env = "METAC_DISCOVERY_INTERVAL", default_value = "30s", value_parser = parse_duration)]
    discovery_interval: Duration,

    /// Informer relist/cache-flush interval (§6).
    #[arg(long, env = "METAC_CACHE_FLUSH_INTERVAL", default_value = "30m", value_parser = parse_duration)]
    cache_flush_interval: Duration,

    /// Address the debug/metrics server binds to (§6).
    #[arg(long, env = "METAC_DEBUG_ADDR", default_value = "0.0.0.0:9999")]
    debug_addr: String,

    /// Path to a kubeconfig; falls back to in-cluster config when unset (§6).
    #[arg(long, env = "METAC_CLIENT_CONFIG_PATH")]
    client_config_path: Option<PathBuf>,

    /// Worker pool size per watch controller (§6).
    #[arg(long, env = "METAC_WORKERS_COUNT", default_value_t = 5)]
    workers_count: usize,

    /// Client-side rate limit QPS (§6); applied to the underlying `kube::Client` config.
    #[arg(long, env = "METAC_CLIENT_GO_QPS", default_value_t = 5.0)]
    client_go_qps: f32,

    /// Client-side rate limit burst (§6).
    #[arg(long, env = "METAC_CLIENT_GO_BURST", default_value_t = 10)]
    client_go_burst: u32,

    /// Load configurations from `--metac-config-path` instead of watching CRDs (§6).
    #[arg(long, env = "METAC_RUN_AS_LOCAL", default_value_t = false)]
    run_as_local: bool,

    /// Directory of YAML configuration documents, used only with `--run-as-local` (§6).
    #[arg(long, env = "METAC_CONFIG_PATH", default_value = "/etc/config/metac/")]
    metac_config_path: PathBuf,

    /// Provenance annotation/finalizer domain prefix (§3).
    #[arg(long, env = "METAC_DOMAIN", default_value = "metac.example.io")]
    domain: String,

    /// `tracing_subscriber::EnvFilter` directive string.
    #[arg(long, env = "METAC_LOG_FILTER", default_value = "info")]
    log_filter: String,

    /// Log output format.
    #[arg(long, env = "METAC_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

/// A tiny subset of `humantime`'s grammar (`30s`, `5m`, `1h`) — the engine's own flags only
/// ever need these three units, so we don't pull in the crate for one parser.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (num, unit) = s.split_at(s.len().saturating_sub(1));
    let n: u64 = num.parse().map_err(|_| format!("invalid duration {s:?}"))?;
    match unit {
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        _ => Err(format!("invalid duration unit in {s:?} (expected s/m/h)")),
    }
}

async fn build_client(cli: &Cli) -> Result<kube::Client> {
    match &cli.client_config_path {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("reading kubeconfig from {}", path.display()))?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default()).await?;
            kube::Client::try_from(config).context("building kube client")
        }
        None => kube::Client::try_default().await.context("building in-cluster/default kube client"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_filter, cli.log_format);
    info!(discovery_interval = ?cli.discovery_interval, workers_count = cli.workers_count, "metac starting");

    let metrics = Arc::new(Metrics::new());

    let client = build_client(&cli).await?;
    let discovery_handle = DiscoveryCache::start(client.clone(), cli.discovery_interval, metrics.clone()).await?;
    let discovery = discovery_handle.cache.clone();
    let dynamic_client = DynamicClient::new(client.clone(), discovery.clone());
    let informers = SharedInformerFactory::new(client.clone(), discovery.clone());

    let metrics_addr = cli.debug_addr.parse().context("parsing --debug-addr")?;
    let metrics_server = tokio::spawn({
        let metrics = metrics.clone();
        async move {
            if let Err(e) = metrics::serve(metrics_addr, metrics).await {
                tracing::error!(error = %e, "debug/metrics server exited");
            }
        }
    });

    let (supervisors, local_controllers) = if cli.run_as_local {
        (Vec::new(), start_local_controllers(&cli, dynamic_client.clone(), informers.clone(), metrics.clone()).await?)
    } else {
        (start_crd_supervisors(&cli, dynamic_client.clone(), informers.clone(), metrics.clone()).await?, Vec::new())
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received shutdown signal"),
        _ = wait_for_sigterm() => info!("received SIGTERM"),
    }

    for supervisor in supervisors {
        supervisor.stop().await;
    }
    for controller in local_controllers {
        controller.stop().await;
    }
    metrics_server.abort();
    discovery_handle.stop().await;
    info!("metac stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending().await
}

/// CRD mode (default, §6): one supervisor per configuration kind, each watching that kind's
/// CRD instances cluster-wide.
async fn start_crd_supervisors(
    cli: &Cli,
    client: DynamicClient,
    informers: SharedInformerFactory,
    metrics: Arc<Metrics>,
) -> Result<Vec<Arc<MetaSupervisor>>> {
    let mut out = Vec::new();
    for kind in [ConfigKind::Composite, ConfigKind::Decorator, ConfigKind::Generic] {
        let domain = cli.domain.clone();
        let worker_count = cli.workers_count;
        let builder: metac_runtime::ConfigBuilder = Arc::new(move |obj| {
            config::build_watch_controller_config(kind, &domain, worker_count, obj).map_err(to_runtime_error)
        });
        let supervisor_config = SupervisorConfig {
            config_gvk: kind.gvk(&cli.domain),
            config_namespace: None,
            resync: Some(cli.cache_flush_interval),
        };
        let supervisor =
            MetaSupervisor::start(supervisor_config, client.clone(), informers.clone(), builder, metrics.clone()).await?;
        out.push(supervisor);
    }
    Ok(out)
}

/// `--run-as-local` (§6): configurations come from YAML documents rather than CRD watches, so
/// there's no live source to re-diff against — each document's controller is built and started
/// once at startup and stopped directly on shutdown.
async fn start_local_controllers(
    cli: &Cli,
    client: DynamicClient,
    informers: SharedInformerFactory,
    metrics: Arc<Metrics>,
) -> Result<Vec<Arc<metac_runtime::WatchController>>> {
    let documents = config::load_local_configs(&cli.metac_config_path)?;
    if documents.is_empty() {
        tracing::warn!(path = %cli.metac_config_path.display(), "no configuration documents found");
    }
    let mut controllers = Vec::new();
    for (kind, object) in documents {
        let wc_config = config::build_watch_controller_config(kind, &cli.domain, cli.workers_count, &object)?;
        let controller =
            metac_runtime::WatchController::start(wc_config, client.clone(), informers.clone(), metrics.clone()).await?;
        controllers.push(controller);
    }
    info!(count = controllers.len(), "local configurations started");
    Ok(controllers)
}

fn to_runtime_error(e: anyhow::Error) -> metac_runtime::Error {
    metac_runtime::Error::InvalidConfiguration { name: "local".to_string(), reason: e.to_string() }
}
