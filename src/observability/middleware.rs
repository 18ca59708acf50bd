use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::TraceContextExt;
use std::{future::Future, sync::Arc, time::Instant};
use tracing::{error, info, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::Metrics;

/// Request span, access log and HTTP metrics for every routed request
pub async fn observability_middleware(
    metrics: Arc<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    // Group metrics by route template so product ids do not explode label cardinality
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_string())
        .unwrap_or_else(|| uri.clone());

    let span_name = format!("{} {}", method, endpoint);
    let span = tracing::info_span!(
        target: "cart_rs::http",
        "{}", span_name,
        otel.name = %span_name,
        otel.kind = "server",
        http.method = %method,
        http.route = %endpoint,
        http.url = %uri,
        http.user_agent = %user_agent,
        http.status_code = tracing::field::Empty,
        http.response_time_ms = tracing::field::Empty,
    );

    async {
        let _in_flight = InFlightGuard::new(&metrics, &method, &endpoint);

        let trace_id = tracing::Span::current()
            .context()
            .span()
            .span_context()
            .trace_id()
            .to_string();

        let response = next.run(request).await;

        let duration = start_time.elapsed();
        let duration_ms = duration.as_millis();
        let status_code = response.status().as_u16();

        let current_span = tracing::Span::current();
        current_span.record("http.status_code", status_code);
        current_span.record("http.response_time_ms", duration_ms);

        let otel_context = current_span.context();
        if status_code >= 500 {
            otel_context
                .span()
                .set_status(opentelemetry::trace::Status::error("HTTP error"));
        } else {
            otel_context.span().set_status(opentelemetry::trace::Status::Ok);
        }

        metrics.record_http_request(&method, &endpoint, status_code, duration.as_secs_f64());

        if status_code >= 500 {
            error!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request failed"
            );
        } else if status_code >= 400 {
            warn!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request rejected"
            );
        } else {
            info!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request completed"
            );
        }

        response
    }
    .instrument(span)
    .await
}

/// Counts a request as in flight until dropped, including when the request
/// future is cancelled
struct InFlightGuard<'a> {
    metrics: &'a Metrics,
    method: &'a str,
    endpoint: &'a str,
}

impl<'a> InFlightGuard<'a> {
    fn new(metrics: &'a Metrics, method: &'a str, endpoint: &'a str) -> Self {
        metrics.increment_in_flight(method, endpoint);
        Self {
            metrics,
            method,
            endpoint,
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.decrement_in_flight(self.method, self.endpoint);
    }
}

/// Times key-value backend calls and records them in the backend metrics.
///
/// Metrics are optional so repositories can be used without a registry.
#[derive(Clone)]
pub struct BackendTracingMiddleware {
    backend: &'static str,
    metrics: Option<Arc<Metrics>>,
}

impl BackendTracingMiddleware {
    pub fn new(backend: &'static str, metrics: Option<Arc<Metrics>>) -> Self {
        Self { backend, metrics }
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub async fn trace_operation<F, T, E>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let result = future.await;
        let duration_seconds = start_time.elapsed().as_secs_f64();

        if let Some(metrics) = &self.metrics {
            metrics.record_backend_operation(
                operation,
                self.backend,
                result.is_ok(),
                duration_seconds,
            );
        }

        if let Err(error) = &result {
            error!(
                operation = operation,
                backend = self.backend,
                error = %error,
                duration_ms = start_time.elapsed().as_millis(),
                "Backend operation failed"
            );
        }

        result
    }
}
