//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Corral server:
//! - HTTP request metrics (latency, counts)
//! - Site and glidein counts by state (collected dynamically)
//! - Everything the engine itself exports

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use corral_core::{GlideinState, ResourceFilter, SiteState};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "corral_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("corral_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "corral_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Resource Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "corral_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

pub static SITES_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("corral_sites_by_state", "Current site count by state"),
        &["state"],
    )
    .unwrap()
});

pub static GLIDEINS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("corral_glideins_by_state", "Current glidein count by state"),
        &["state"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Resources
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(SITES_BY_STATE.clone()))
        .unwrap();
    registry
        .register(Box::new(GLIDEINS_BY_STATE.clone()))
        .unwrap();

    // Engine metrics (events, jobs, recovery)
    for metric in corral_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Upper bound on entities counted per state.
const COUNT_LIMIT: i64 = 100_000;

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the store at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator();
    ORCHESTRATOR_RUNNING.set(if orchestrator.is_running() { 1 } else { 0 });

    for site_state in [
        SiteState::New,
        SiteState::Staging,
        SiteState::Ready,
        SiteState::Failed,
        SiteState::Exiting,
        SiteState::Removing,
        SiteState::Deleted,
    ] {
        let filter = ResourceFilter::new()
            .with_state(site_state.as_str())
            .with_limit(COUNT_LIMIT);
        if let Ok(sites) = orchestrator.list_sites(&filter) {
            SITES_BY_STATE
                .with_label_values(&[site_state.as_str()])
                .set(sites.len() as i64);
        }
    }

    for glidein_state in [
        GlideinState::New,
        GlideinState::Waiting,
        GlideinState::Submitted,
        GlideinState::Queued,
        GlideinState::Running,
        GlideinState::Finished,
        GlideinState::Failed,
        GlideinState::Removing,
        GlideinState::Deleted,
    ] {
        let filter = ResourceFilter::new()
            .with_state(glidein_state.as_str())
            .with_limit(COUNT_LIMIT);
        if let Ok(glideins) = orchestrator.list_glideins(&filter) {
            GLIDEINS_BY_STATE
                .with_label_values(&[glidein_state.as_str()])
                .set(glideins.len() as i64);
        }
    }
}

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    NUMERIC_SEGMENT.replace_all(path, "/{id}$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/sites/42"), "/api/v1/sites/{id}");
        assert_eq!(
            normalize_path("/api/v1/glideins/7/history"),
            "/api/v1/glideins/{id}/history"
        );
    }

    #[test]
    fn test_normalize_path_without_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_registry_includes_engine_metrics() {
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        let text = encode_metrics();
        assert!(text.contains("corral_http_requests_in_flight"));
    }
}
