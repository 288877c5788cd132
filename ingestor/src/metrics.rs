use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref VALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_valid_messages_total",
        "Total readings that passed validation"
    ))
    .unwrap();
    pub static ref INVALID_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_invalid_messages_total",
        "Total malformed messages dropped"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_db_failures_total",
        "Total readings lost to store failures"
    ))
    .unwrap();
    pub static ref STORE_RECONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_store_reconnects_total",
        "Total attempts to replace a closed store connection"
    ))
    .unwrap();
    pub static ref DRY_ALERTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_dry_alerts_total",
        "Total too-dry alerts emitted"
    ))
    .unwrap();
    pub static ref WET_ALERTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_wet_alerts_total",
        "Total too-wet alerts emitted"
    ))
    .unwrap();
    pub static ref APPEND_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_append_latency_seconds",
            "Time taken to commit one reading"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALID_MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVALID_MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_RECONNECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DRY_ALERTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WET_ALERTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APPEND_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
