use crate::{BackendKind, Error};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time::Instant;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
    pub error: String,
}

#[derive(Clone)]
pub struct RegistryMetrics {
    pub builds: Family<KindLabels, Counter>,
    pub failures: Family<ErrorLabels, Counter>,
    pub removals: Counter,
    pub instances: Gauge,
    pub duration: Family<KindLabels, Histogram>,
}

fn duration_histogram() -> Histogram {
    Histogram::new([0.01, 0.05, 0.1, 0.25, 0.5, 1., 2.5, 5., 15.].into_iter())
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self {
            builds: Family::<KindLabels, Counter>::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            removals: Counter::default(),
            instances: Gauge::default(),
            duration: Family::<KindLabels, Histogram>::new_with_constructor(duration_histogram),
        }
    }
}

impl RegistryMetrics {
    /// Register registry metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        let sub = r.sub_registry_with_prefix("client_registry");
        sub.register_with_unit(
            "build_duration",
            "client bundle build duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        sub.register("builds", "client bundle build attempts", self.builds.clone());
        sub.register("failures", "client bundle decode or build errors", self.failures.clone());
        sub.register("removals", "client bundles removed", self.removals.clone());
        sub.register("instances", "instances with a registered client bundle", self.instances.clone());
        self
    }

    pub fn build_failure(&self, kind: BackendKind, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                kind: kind.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self, kind: BackendKind) -> BuildMeasurer {
        let labels = KindLabels { kind: kind.to_string() };
        self.builds.get_or_create(&labels).inc();
        BuildMeasurer {
            start: Instant::now(),
            metric: self.duration.get_or_create(&labels).clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct BuildMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for BuildMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}
