//! Prometheus metrics for the prediction pipeline.
//!
//! Collectors live in a process-wide registry and are safe to update from any
//! thread. Recording is unconditional; `init_metrics` only decides whether the
//! collectors are exported through `/metrics`.
//!
//! # Example
//! ```no_run
//! use student_risk_engine::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["High"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};

const NAMESPACE: &str = "student_risk_engine";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Successful predictions
    ///
    /// Labels: risk_level
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of successful predictions")
            .namespace(NAMESPACE),
        &["risk_level"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Failed predictions
    ///
    /// Labels: code
    pub static ref PREDICTION_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed predictions")
            .namespace(NAMESPACE),
        &["code"]
    ).expect("Failed to create PREDICTION_ERRORS_TOTAL metric");

    /// Categorical values that fell back to the default code
    ///
    /// Labels: column
    pub static ref UNSEEN_CATEGORIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("unseen_categories_total", "Categorical values not seen at fit time")
            .namespace(NAMESPACE),
        &["column"]
    ).expect("Failed to create UNSEEN_CATEGORIES_TOTAL metric");

    /// End-to-end latency of a single prediction
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Single prediction duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Batch rows by outcome
    ///
    /// Labels: outcome (success, error)
    pub static ref BATCH_RECORDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("batch_records_total", "Total number of batch rows processed")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create BATCH_RECORDS_TOTAL metric");
}

/// Register every collector with the global registry. Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    register(Box::new(PREDICTION_ERRORS_TOTAL.clone()))?;
    register(Box::new(UNSEEN_CATEGORIES_TOTAL.clone()))?;
    register(Box::new(PREDICTION_DURATION_SECONDS.clone()))?;
    register(Box::new(BATCH_RECORDS_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Export metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
