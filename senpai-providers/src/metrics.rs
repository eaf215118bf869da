//! Prometheus metrics for upstream traffic
//!
//! This is the monitoring hook every upstream call passes through: request
//! counts per host and outcome, rate-limit signals, and response cache hits.

use prometheus::{
    register_counter_vec_with_registry, CounterVec, Encoder, Registry, TextEncoder,
};

/// Crate-level metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Upstream requests by logical host and outcome (`ok`, `rate_limited`, `error`)
pub static UPSTREAM_REQUESTS_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "upstream_requests_total",
        "Total number of upstream requests",
        &["host", "outcome"],
        REGISTRY.clone()
    ).expect("Failed to register UPSTREAM_REQUESTS_TOTAL")
});

/// Rate-limit signals (HTTP 429 or a "too many requests" body) by logical host
pub static UPSTREAM_RATE_LIMITED_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "upstream_rate_limited_total",
        "Total number of rate-limited upstream responses",
        &["host"],
        REGISTRY.clone()
    ).expect("Failed to register UPSTREAM_RATE_LIMITED_TOTAL")
});

/// Response cache lookups by result (`hit`, `miss`)
pub static RESPONSE_CACHE_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "response_cache_total",
        "Total number of response cache lookups",
        &["result"],
        REGISTRY.clone()
    ).expect("Failed to register RESPONSE_CACHE_TOTAL")
});

/// Record the outcome of one upstream call.
pub fn record_request(host: &str, error: Option<&crate::UpstreamError>) {
    let outcome = match error {
        None => "ok",
        Some(e) if e.is_rate_limited() => {
            UPSTREAM_RATE_LIMITED_TOTAL.with_label_values(&[host]).inc();
            "rate_limited"
        }
        Some(_) => "error",
    };
    UPSTREAM_REQUESTS_TOTAL.with_label_values(&[host, outcome]).inc();
}

/// Render all metrics in the Prometheus text exposition format.
#[must_use]
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
