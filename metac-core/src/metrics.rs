//! Reconcile/hook/discovery/workqueue counters (§6's `--debug-addr` metrics surface), grouped
//! under one handle so every crate in the process can share a single `Arc<Metrics>` rather
//! than threading individual gauges through constructors.
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};

pub struct Metrics {
    registry: Registry,
    pub reconciles_total: IntCounterVec,
    pub reconcile_duration_seconds: HistogramVec,
    pub hook_calls_total: IntCounterVec,
    pub hook_duration_seconds: HistogramVec,
    pub discovery_refresh_total: IntCounterVec,
    pub discovery_last_refresh_age_seconds: IntGaugeVec,
    pub workqueue_depth: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let reconciles_total = IntCounterVec::new(
            prometheus::Opts::new("metac_reconciles_total", "Reconcile attempts by flavor/configuration/outcome"),
            &["flavor", "name", "outcome"],
        )
        .unwrap();
        let reconcile_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("metac_reconcile_duration_seconds", "Reconcile latency"),
            &["flavor", "name"],
        )
        .unwrap();
        let hook_calls_total = IntCounterVec::new(
            prometheus::Opts::new("metac_hook_calls_total", "Hook calls by name/hook-kind/outcome"),
            &["name", "hook", "outcome"],
        )
        .unwrap();
        let hook_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("metac_hook_duration_seconds", "Hook call latency"),
            &["name", "hook"],
        )
        .unwrap();
        let discovery_refresh_total = IntCounterVec::new(
            prometheus::Opts::new("metac_discovery_refresh_total", "Discovery cache refresh attempts by outcome"),
            &["outcome"],
        )
        .unwrap();
        let discovery_last_refresh_age_seconds = IntGaugeVec::new(
            prometheus::Opts::new("metac_discovery_last_refresh_age_seconds", "Age of the last successful discovery refresh"),
            &["cache"],
        )
        .unwrap();
        let workqueue_depth = IntGaugeVec::new(
            prometheus::Opts::new("metac_workqueue_depth", "Pending items in a controller's workqueue"),
            &["name"],
        )
        .unwrap();

        for c in [
            Box::new(reconciles_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(hook_calls_total.clone()),
            Box::new(discovery_refresh_total.clone()),
        ] {
            registry.register(c).expect("metric registration");
        }
        for h in [reconcile_duration_seconds.clone(), hook_duration_seconds.clone()] {
            registry.register(Box::new(h)).expect("metric registration");
        }
        for g in [discovery_last_refresh_age_seconds.clone(), workqueue_depth.clone()] {
            registry.register(Box::new(g)).expect("metric registration");
        }

        Self {
            registry,
            reconciles_total,
            reconcile_duration_seconds,
            hook_calls_total,
            hook_duration_seconds,
            discovery_refresh_total,
            discovery_last_refresh_age_seconds,
            workqueue_depth,
        }
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
