use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts, Registry,
    TextEncoder,
};

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    media_actions_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn build() -> prometheus::Result<Metrics> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        PromOpts::new(
            "clipcast_http_requests_total",
            "Total HTTP requests served by clipcast-server.",
        ),
        &["status"],
    )?;
    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "clipcast_http_request_duration_seconds",
            "HTTP request latency in seconds (time to response head for streamed bodies).",
        ),
        &["status"],
    )?;
    let http_in_flight_requests = IntGauge::new(
        "clipcast_http_in_flight_requests",
        "Current number of in-flight HTTP requests.",
    )?;
    let media_actions_total = IntCounterVec::new(
        PromOpts::new(
            "clipcast_media_actions_total",
            "Media operations requested, by action and outcome.",
        ),
        &["action", "outcome"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(http_in_flight_requests.clone()))?;
    registry.register(Box::new(media_actions_total.clone()))?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        http_in_flight_requests,
        media_actions_total,
    })
}

pub fn init() -> prometheus::Result<()> {
    if METRICS.get().is_none() {
        let _ = METRICS.set(build()?);
    }
    Ok(())
}

pub fn record_action(action: &str, outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.media_actions_total
            .with_label_values(&[action, outcome])
            .inc();
    }
}

pub async fn prometheus_metrics() -> Response {
    let Some(m) = METRICS.get() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response();
    };

    let families = m.registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_owned();

    let Some(m) = METRICS.get() else {
        return next.run(req).await;
    };
    if route == "/metrics" || route == "/healthz" {
        return next.run(req).await;
    }

    let start = Instant::now();

    m.http_in_flight_requests.inc();
    let response = next.run(req).await;
    m.http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    m.http_requests_total.with_label_values(&[&status]).inc();
    m.http_request_duration_seconds
        .with_label_values(&[&status])
        .observe(start.elapsed().as_secs_f64());

    response
}
