//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Gauge, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "circlet_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Domain Metrics
    pub static ref POSTS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_posts_created_total", "Total number of posts created"),
        &["post_type"]
    ).expect("metric can be created");
    pub static ref VOTES_CAST_TOTAL: IntCounter = IntCounter::new(
        "circlet_votes_cast_total",
        "Total number of poll ballots accepted"
    ).expect("metric can be created");
    pub static ref SEEN_MARKS_TOTAL: IntCounter = IntCounter::new(
        "circlet_seen_marks_total",
        "Total number of seen marks recorded"
    ).expect("metric can be created");
    pub static ref FEED_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_feed_requests_total", "Total number of feed reads"),
        &["feed"]
    ).expect("metric can be created");

    // Fan-out Metrics
    pub static ref EVENTS_EMITTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_events_emitted_total", "Total number of fan-out events emitted"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref EVENT_DELIVERY_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_event_delivery_failures_total", "Total number of fan-out deliveries that failed"),
        &["kind"]
    ).expect("metric can be created");

    // Enrichment Metrics
    pub static ref ENRICHMENT_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_enrichment_outcomes_total", "Link enrichment outcomes"),
        &["outcome"]
    ).expect("metric can be created");

    // Application Metrics
    pub static ref APP_UPTIME_SECONDS: Gauge = Gauge::new(
        "circlet_app_uptime_seconds",
        "Application uptime in seconds"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("circlet_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(POSTS_CREATED_TOTAL.clone()))
        .expect("POSTS_CREATED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(VOTES_CAST_TOTAL.clone()))
        .expect("VOTES_CAST_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SEEN_MARKS_TOTAL.clone()))
        .expect("SEEN_MARKS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FEED_REQUESTS_TOTAL.clone()))
        .expect("FEED_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EVENTS_EMITTED_TOTAL.clone()))
        .expect("EVENTS_EMITTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EVENT_DELIVERY_FAILURES_TOTAL.clone()))
        .expect("EVENT_DELIVERY_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ENRICHMENT_OUTCOMES_TOTAL.clone()))
        .expect("ENRICHMENT_OUTCOMES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(APP_UPTIME_SECONDS.clone()))
        .expect("APP_UPTIME_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
