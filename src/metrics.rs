use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static ENVELOPES_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "realtime_push_envelopes_published_total",
        "Broadcast envelopes emitted on the shared channel",
    )
    .expect("failed to create realtime_push_envelopes_published_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_push_envelopes_published_total");
    counter
});

static PUBLISH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_push_publish_failures_total",
            "Publish calls that dropped their message",
        ),
        &["reason"],
    )
    .expect("failed to create realtime_push_publish_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_push_publish_failures_total");
    counter
});

static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_push_deliveries_total",
            "Broadcast envelopes handled by this instance, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create realtime_push_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_push_deliveries_total");
    counter
});

static OPEN_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_push_open_connections",
        "WebSocket connections registered on this instance",
    )
    .expect("failed to create realtime_push_open_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_push_open_connections");
    gauge
});

pub fn record_published() {
    ENVELOPES_PUBLISHED_TOTAL.inc();
}

pub fn record_publish_failure(reason: &str) {
    PUBLISH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_delivery(outcome: &str) {
    DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_open_connections(count: usize) {
    OPEN_CONNECTIONS.set(count as i64);
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
