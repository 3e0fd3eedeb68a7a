use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<ResultLabels, Counter>,
    requeues: Family<KindLabels, Counter>,
    duration: Family<KindLabels, Histogram>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct KindLabels {
    kind: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ResultLabels {
    kind: &'static str,
    result: &'static str,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::<ResultLabels, Counter>::default();
        reg.register(
            "reconciles",
            "Total number of reconciliations by object kind and result",
            reconciles.clone(),
        );

        let requeues = Family::<KindLabels, Counter>::default();
        reg.register(
            "requeues",
            "Total number of failed reconciliations scheduled for retry",
            requeues.clone(),
        );

        let duration = Family::<KindLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.01, 0.1, 1.0, 10.0, 60.0])
        });
        reg.register_with_unit(
            "reconcile_duration",
            "Histogram of the time spent reconciling a single object",
            Unit::Seconds,
            duration.clone(),
        );

        Self {
            reconciles,
            requeues,
            duration,
        }
    }

    pub(crate) fn observe(
        &self,
        kind: &'static str,
        result: &'static str,
        start: time::Instant,
    ) {
        self.reconciles
            .get_or_create(&ResultLabels { kind, result })
            .inc();
        self.duration
            .get_or_create(&KindLabels { kind })
            .observe(start.elapsed().as_secs_f64());
    }

    pub(crate) fn requeued(&self, kind: &'static str) {
        self.requeues.get_or_create(&KindLabels { kind }).inc();
    }
}
