use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Legato metrics
const PREFIX: &str = "legato";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Synthesis Metrics
    pub static ref SYNTHESIS_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_synthesis_requests_total"), "Synthesis runs by outcome"),
        &["outcome", "format"]
    ).expect("Failed to create synthesis_requests_total metric");

    pub static ref SYNTHESIS_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_synthesis_duration_seconds"),
            "End to end synthesis duration in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["format"]
    ).expect("Failed to create synthesis_duration_seconds metric");

    pub static ref STAGE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_stage_duration_seconds"),
            "External tool run duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["stage", "outcome"]
    ).expect("Failed to create stage_duration_seconds metric");

    pub static ref SOUNDFONT_AVAILABLE: Gauge = Gauge::new(
        format!("{PREFIX}_soundfont_available"),
        "1 if a SoundFont was found on the last lookup, 0 otherwise"
    ).expect("Failed to create soundfont_available metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SYNTHESIS_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNTHESIS_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(STAGE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SOUNDFONT_AVAILABLE.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Collapse request paths to the known routes so label cardinality stays bounded
pub fn categorize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/synthesize" => "/synthesize",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let endpoint = categorize_endpoint(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Record the outcome of a full synthesis run
pub fn record_synthesis(outcome: &str, format: &str, duration: Duration) {
    SYNTHESIS_REQUESTS_TOTAL
        .with_label_values(&[outcome, format])
        .inc();
    SYNTHESIS_DURATION_SECONDS
        .with_label_values(&[format])
        .observe(duration.as_secs_f64());
}

/// Record one external tool run
pub fn record_stage(stage: &str, outcome: &str, duration: Duration) {
    STAGE_DURATION_SECONDS
        .with_label_values(&[stage, outcome])
        .observe(duration.as_secs_f64());
}

pub fn set_soundfont_available(available: bool) {
    SOUNDFONT_AVAILABLE.set(if available { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
