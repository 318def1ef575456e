use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Work unit counter by stage and outcome
    pub static ref UNITS: IntCounterVec = IntCounterVec::new(
        Opts::new("work_units", "The number of work units processed"),
        &["stage", "outcome"]
    ).unwrap();
    // Stage histogram by run time
    pub static ref STAGE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("stage_time", "The time taken to run each stage"),
            buckets: prometheus::exponential_buckets(0.01, 4.0, 10).unwrap(),
        },
        &["function"],
    ).unwrap();
}

static REGISTER: std::sync::Once = std::sync::Once::new();

/// Register the metrics with [REGISTRY]. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(UNITS.clone())).unwrap();
        REGISTRY
            .register(Box::new(STAGE_TIME_COLLECTOR.clone()))
            .unwrap();
    });
}

/// Returns the registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", err);
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

/// Outcome label of a work unit
#[derive(Clone, Copy, Debug)]
pub enum Outcome {
    Computed,
    Skipped,
    Failed,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Computed => "computed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Count `n` work units of `stage` with the given outcome.
pub fn record_units(stage: &str, outcome: Outcome, n: usize) {
    UNITS
        .with_label_values(&[stage, outcome.label()])
        .inc_by(n as u64);
}

/// Record the run time of a stage.
pub fn record_stage_time(function: &str, elapsed: std::time::Duration) {
    STAGE_TIME_COLLECTOR
        .with_label_values(&[function])
        .observe(elapsed.as_secs_f64());
}
