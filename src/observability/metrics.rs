//! Gateway metrics in Prometheus text format

use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const PREFIX: &str = "community_gateway";

/// Point-in-time snapshot of the gateway counters
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub total_requests: u64,
    pub forwarded: u64,
    pub unauthorized: u64,
    pub rate_limited: u64,
    pub not_found: u64,
    pub backend_errors: u64,
    pub internal_errors: u64,

    /// Requests admitted without a limiter decision
    pub rate_limit_degraded: u64,

    /// Revocation lookups that failed and were treated as not revoked
    pub revocation_errors: u64,

    pub avg_response_time_ms: f64,
    pub uptime_secs: u64,
}

/// Latency histogram buckets (in milliseconds)
const LATENCY_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0];

/// Cumulative latency histogram
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        Self {
            buckets: buckets.iter().map(|&b| (b, AtomicU64::new(0))).collect(),
            sum_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        self.sum_ms.fetch_add(ms as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (bound, counter) in &self.buckets {
            if ms <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn write_prometheus(&self, out: &mut String, name: &str, help: &str) {
        let name = format!("{}_{}", PREFIX, name);
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);

        for (bound, counter) in &self.buckets {
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, counter.load(Ordering::Relaxed));
        }

        let count = self.count();
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
        let _ = writeln!(out, "{}_sum {:.3}", name, self.sum_ms.load(Ordering::Relaxed) as f64);
        let _ = writeln!(out, "{}_count {}", name, count);
        out.push('\n');
    }
}

/// Metrics collector shared by the dispatcher, filters and forwarder
pub struct MetricsCollector {
    start_time: Instant,
    total_requests: AtomicU64,
    total_response_time_ms: AtomicU64,
    forwarded: AtomicU64,
    unauthorized: AtomicU64,
    rate_limited: AtomicU64,
    not_found: AtomicU64,
    backend_errors: AtomicU64,
    internal_errors: AtomicU64,
    rate_limit_degraded: AtomicU64,
    revocation_errors: AtomicU64,

    request_latency: Histogram,
    rate_limit_latency: Histogram,
    upstream_latency: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_response_time_ms: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            unauthorized: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            rate_limit_degraded: AtomicU64::new(0),
            revocation_errors: AtomicU64::new(0),
            request_latency: Histogram::new(LATENCY_BUCKETS),
            rate_limit_latency: Histogram::new(LATENCY_BUCKETS),
            upstream_latency: Histogram::new(LATENCY_BUCKETS),
        }
    }

    /// Record a completed request, whatever its outcome
    pub fn record_request(&self, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);
        self.request_latency.observe(response_time);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a gateway-internal failure
    pub fn record_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_degraded(&self) {
        self.rate_limit_degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revocation_error(&self) {
        self.revocation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one rate-limit store round trip
    pub fn record_rate_limit_latency(&self, duration: Duration) {
        self.rate_limit_latency.observe(duration);
    }

    /// Record one backend round trip
    pub fn record_upstream_latency(&self, duration: Duration) {
        self.upstream_latency.observe(duration);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> SystemMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time_ms.load(Ordering::Relaxed);

        let avg_response_time_ms = if total_requests > 0 {
            total_response_time as f64 / total_requests as f64
        } else {
            0.0
        };

        SystemMetrics {
            total_requests,
            forwarded: self.forwarded.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            rate_limit_degraded: self.rate_limit_degraded.load(Ordering::Relaxed),
            revocation_errors: self.revocation_errors.load(Ordering::Relaxed),
            avg_response_time_ms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let m = self.get_metrics();
        let counters: [(&str, &str, u64); 10] = [
            ("requests_total", "Total number of requests", m.total_requests),
            ("forwarded_total", "Requests forwarded to a backend", m.forwarded),
            ("unauthorized_total", "Requests rejected for a missing or invalid credential", m.unauthorized),
            ("rate_limited_total", "Requests rejected by the rate limiter", m.rate_limited),
            ("not_found_total", "Requests matching no route", m.not_found),
            ("backend_errors_total", "Requests whose backend was unreachable", m.backend_errors),
            ("internal_errors_total", "Requests failed inside the gateway", m.internal_errors),
            ("rate_limit_degraded_total", "Requests admitted while the rate limit store was unavailable", m.rate_limit_degraded),
            ("revocation_errors_total", "Failed revocation lookups", m.revocation_errors),
            ("uptime_seconds", "Uptime in seconds", m.uptime_secs),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {}_{} {}", PREFIX, name, help);
            let _ = writeln!(output, "# TYPE {}_{} counter", PREFIX, name);
            let _ = writeln!(output, "{}_{} {}\n", PREFIX, name, value);
        }

        let _ = writeln!(output, "# HELP {}_avg_response_time_ms Average response time in milliseconds", PREFIX);
        let _ = writeln!(output, "# TYPE {}_avg_response_time_ms gauge", PREFIX);
        let _ = writeln!(output, "{}_avg_response_time_ms {:.2}\n", PREFIX, m.avg_response_time_ms);

        self.request_latency.write_prometheus(
            &mut output,
            "request_duration_ms",
            "Request duration in milliseconds",
        );
        self.rate_limit_latency.write_prometheus(
            &mut output,
            "rate_limit_store_duration_ms",
            "Rate limit store call duration in milliseconds",
        );
        self.upstream_latency.write_prometheus(
            &mut output,
            "upstream_duration_ms",
            "Backend call duration in milliseconds",
        );

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_request(Duration::from_millis(100));
        collector.record_request(Duration::from_millis(200));
        collector.record_forwarded();
        collector.record_unauthorized();
        collector.record_rate_limited();
        collector.record_rate_limit_degraded();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.forwarded, 1);
        assert_eq!(metrics.unauthorized, 1);
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.rate_limit_degraded, 1);
        assert_eq!(metrics.avg_response_time_ms, 150.0);
    }

    #[test]
    fn test_prometheus_export() {
        let collector = MetricsCollector::new();
        collector.record_request(Duration::from_millis(100));
        collector.record_upstream_latency(Duration::from_millis(3));

        let prometheus = collector.export_prometheus();

        assert!(prometheus.contains("community_gateway_requests_total 1"));
        assert!(prometheus.contains("community_gateway_avg_response_time_ms 100.00"));
        assert!(prometheus.contains("community_gateway_upstream_duration_ms_bucket{le=\"5\"} 1"));
        assert!(prometheus.contains("community_gateway_upstream_duration_ms_bucket{le=\"1\"} 0"));
        assert!(prometheus.contains("community_gateway_request_duration_ms_count 1"));
    }
}
