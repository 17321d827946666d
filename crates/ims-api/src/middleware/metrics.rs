//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded in
//! middleware. Domain-level gauges (orders and purchases by status, catalog
//! sizes, journal length) are updated on each `/metrics` scrape (pull
//! model) — see the metrics handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics (push model) --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Domain gauges (pull model, updated on /metrics scrape) --
    orders_total: GaugeVec,
    purchases_total: GaugeVec,
    products_total: prometheus::Gauge,
    warehouses_total: prometheus::Gauge,
    users_total: prometheus::Gauge,
    stock_transactions_total: prometheus::Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics").finish()
    }
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("ims_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ims_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )
        .expect("metric can be created");

        let http_errors_total = IntCounterVec::new(
            Opts::new("ims_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let orders_total = GaugeVec::new(
            Opts::new("ims_orders_total", "Total orders by status"),
            &["status"],
        )
        .expect("metric can be created");

        let purchases_total = GaugeVec::new(
            Opts::new("ims_purchases_total", "Total purchases by status"),
            &["status"],
        )
        .expect("metric can be created");

        let products_total =
            prometheus::Gauge::new("ims_products_total", "Total products in the catalog")
                .expect("metric can be created");

        let warehouses_total =
            prometheus::Gauge::new("ims_warehouses_total", "Total warehouses")
                .expect("metric can be created");

        let users_total = prometheus::Gauge::new("ims_users_total", "Total user accounts")
            .expect("metric can be created");

        let stock_transactions_total = prometheus::Gauge::new(
            "ims_stock_transactions_total",
            "Total stock journal entries",
        )
        .expect("metric can be created");

        for collector in [
            Box::new(http_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(http_request_duration_seconds.clone()),
            Box::new(http_errors_total.clone()),
            Box::new(orders_total.clone()),
            Box::new(purchases_total.clone()),
            Box::new(products_total.clone()),
            Box::new(warehouses_total.clone()),
            Box::new(users_total.clone()),
            Box::new(stock_transactions_total.clone()),
        ] {
            registry
                .register(collector)
                .expect("collector registers once");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                orders_total,
                purchases_total,
                products_total,
                warehouses_total,
                users_total,
                stock_transactions_total,
            }),
        }
    }

    /// Record one completed request.
    pub fn record_request(&self, method: &str, path: &str, status: u16, elapsed_secs: f64) {
        let status = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(elapsed_secs);
        if status.starts_with('4') || status.starts_with('5') {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status])
                .inc();
        }
    }

    pub fn orders_total(&self) -> &GaugeVec {
        &self.inner.orders_total
    }

    pub fn purchases_total(&self) -> &GaugeVec {
        &self.inner.purchases_total
    }

    pub fn products_total(&self) -> &prometheus::Gauge {
        &self.inner.products_total
    }

    pub fn warehouses_total(&self) -> &prometheus::Gauge {
        &self.inner.warehouses_total
    }

    pub fn users_total(&self) -> &prometheus::Gauge {
        &self.inner.users_total
    }

    pub fn stock_transactions_total(&self) -> &prometheus::Gauge {
        &self.inner.stock_transactions_total
    }

    /// Gather and encode all metrics in Prometheus text exposition format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware recording request count, duration, and error count.
///
/// Uses the matched route path (`/v1/orders/:id`, not the concrete URI) as
/// the path label to keep cardinality bounded.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    if let Some(metrics) = metrics {
        metrics.record_request(
            &method,
            &path,
            response.status().as_u16(),
            start.elapsed().as_secs_f64(),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_encodes_requests() {
        let metrics = ApiMetrics::new();
        metrics.record_request("GET", "/v1/orders", 200, 0.01);
        metrics.record_request("POST", "/v1/orders", 400, 0.02);

        let encoded = metrics.gather_and_encode().unwrap();
        assert!(encoded.contains("ims_http_requests_total"));
        assert!(encoded.contains("ims_http_errors_total"));
    }

    #[test]
    fn domain_gauges_are_settable() {
        let metrics = ApiMetrics::new();
        metrics.orders_total().with_label_values(&["Pending"]).set(3.0);
        metrics.products_total().set(12.0);

        let encoded = metrics.gather_and_encode().unwrap();
        assert!(encoded.contains("ims_orders_total"));
        assert!(encoded.contains("ims_products_total"));
    }
}
