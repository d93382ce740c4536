//! Metrics Collection for the Relay
//!
//! Atomic counters for forwarded exchanges, a latency ring buffer,
//! and a Prometheus-compatible /metrics rendering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use studio_shared::ForwardError;
use tokio::sync::Mutex;

/// Relay-wide metrics
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    /// Envelopes returned (target answered)
    envelopes: AtomicU64,
    /// Target status code classes
    status_1xx: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    /// Codes outside 100-599
    status_other: AtomicU64,
    /// Proxy-level failures by kind
    setup_failures: AtomicU64,
    no_response_failures: AtomicU64,
    /// Target response body bytes relayed
    bytes_out: AtomicU64,
    latencies: Mutex<LatencyHistogram>,
}

/// Latency histogram for percentile calculation
struct LatencyHistogram {
    /// Recent latencies (ring buffer, microseconds)
    values: Vec<u64>,
    /// Write position
    pos: usize,
    /// Total count
    count: u64,
    /// Sum for average
    sum: u64,
}

impl LatencyHistogram {
    fn new(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity],
            pos: 0,
            count: 0,
            sum: 0,
        }
    }

    fn record(&mut self, latency_us: u64) {
        self.values[self.pos] = latency_us;
        self.pos = (self.pos + 1) % self.values.len();
        self.count += 1;
        self.sum = self.sum.saturating_add(latency_us);
    }

    fn percentile(&self, p: f64) -> u64 {
        let count = self.count.min(self.values.len() as u64) as usize;
        if count == 0 {
            return 0;
        }

        let mut sorted: Vec<u64> = self.values[..count].to_vec();
        sorted.sort_unstable();

        let idx = ((count as f64 * p / 100.0) as usize).min(count - 1);
        sorted[idx]
    }

    fn average(&self) -> u64 {
        if self.count == 0 { 0 } else { self.sum / self.count }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                envelopes: AtomicU64::new(0),
                status_1xx: AtomicU64::new(0),
                status_2xx: AtomicU64::new(0),
                status_3xx: AtomicU64::new(0),
                status_4xx: AtomicU64::new(0),
                status_5xx: AtomicU64::new(0),
                status_other: AtomicU64::new(0),
                setup_failures: AtomicU64::new(0),
                no_response_failures: AtomicU64::new(0),
                bytes_out: AtomicU64::new(0),
                latencies: Mutex::new(LatencyHistogram::new(10000)),
            }),
        }
    }

    /// Record an exchange where the target answered
    pub async fn record_envelope(&self, status: u16, latency_us: u64, bytes_out: u64) {
        self.inner.envelopes.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);

        let bucket = match status / 100 {
            1 => &self.inner.status_1xx,
            2 => &self.inner.status_2xx,
            3 => &self.inner.status_3xx,
            4 => &self.inner.status_4xx,
            5 => &self.inner.status_5xx,
            _ => &self.inner.status_other,
        };
        bucket.fetch_add(1, Ordering::Relaxed);

        self.inner.latencies.lock().await.record(latency_us);
    }

    /// Record a proxy-level failure
    pub fn record_failure(&self, err: &ForwardError) {
        let counter = match err {
            ForwardError::Setup(_) => &self.inner.setup_failures,
            ForwardError::NoResponse(_) => &self.inner.no_response_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelopes(&self) -> u64 {
        self.inner.envelopes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> (u64, u64) {
        (
            self.inner.setup_failures.load(Ordering::Relaxed),
            self.inner.no_response_failures.load(Ordering::Relaxed),
        )
    }

    /// Generate Prometheus-format metrics text
    pub async fn to_prometheus(&self) -> String {
        let lat = self.inner.latencies.lock().await;
        let p50 = lat.percentile(50.0);
        let p95 = lat.percentile(95.0);
        let p99 = lat.percentile(99.0);
        let avg = lat.average();
        drop(lat);

        let (setup, no_response) = self.failures();

        format!(
r#"# HELP studio_relay_envelopes_total Forwarded requests the target answered
# TYPE studio_relay_envelopes_total counter
studio_relay_envelopes_total {}

# HELP studio_relay_target_status Target responses by HTTP status class
# TYPE studio_relay_target_status counter
studio_relay_target_status{{status="1xx"}} {}
studio_relay_target_status{{status="2xx"}} {}
studio_relay_target_status{{status="3xx"}} {}
studio_relay_target_status{{status="4xx"}} {}
studio_relay_target_status{{status="5xx"}} {}
studio_relay_target_status{{status="other"}} {}

# HELP studio_relay_failures_total Forwards that failed at the proxy level
# TYPE studio_relay_failures_total counter
studio_relay_failures_total{{kind="setup"}} {}
studio_relay_failures_total{{kind="no_response"}} {}

# HELP studio_relay_bytes_out_total Target response bytes relayed
# TYPE studio_relay_bytes_out_total counter
studio_relay_bytes_out_total {}

# HELP studio_relay_latency_us Target round-trip latency in microseconds
# TYPE studio_relay_latency_us summary
studio_relay_latency_us{{quantile="0.5"}} {}
studio_relay_latency_us{{quantile="0.95"}} {}
studio_relay_latency_us{{quantile="0.99"}} {}
studio_relay_latency_us_avg {}
"#,
            self.envelopes(),
            self.inner.status_1xx.load(Ordering::Relaxed),
            self.inner.status_2xx.load(Ordering::Relaxed),
            self.inner.status_3xx.load(Ordering::Relaxed),
            self.inner.status_4xx.load(Ordering::Relaxed),
            self.inner.status_5xx.load(Ordering::Relaxed),
            self.inner.status_other.load(Ordering::Relaxed),
            setup,
            no_response,
            self.inner.bytes_out.load(Ordering::Relaxed),
            p50, p95, p99, avg,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let mut h = LatencyHistogram::new(100);
        for v in 1..=100 {
            h.record(v);
        }
        assert_eq!(h.percentile(50.0), 51);
        assert_eq!(h.percentile(99.0), 100);
        assert_eq!(h.average(), 50);
    }

    #[test]
    fn test_empty_histogram() {
        let h = LatencyHistogram::new(10);
        assert_eq!(h.percentile(95.0), 0);
        assert_eq!(h.average(), 0);
    }

    #[test]
    fn test_ring_buffer_wraps() {
        let mut h = LatencyHistogram::new(4);
        for v in [1000, 1000, 1000, 1000, 1, 1, 1, 1] {
            h.record(v);
        }
        assert_eq!(h.percentile(99.0), 1);
    }

    #[tokio::test]
    async fn test_prometheus_counts() {
        let m = Metrics::new();
        m.record_envelope(200, 1500, 10).await;
        m.record_envelope(404, 900, 20).await;
        m.record_failure(&ForwardError::setup("bad url"));
        m.record_failure(&ForwardError::no_response("refused"));
        m.record_failure(&ForwardError::no_response("timeout"));

        let text = m.to_prometheus().await;
        assert!(text.contains("studio_relay_envelopes_total 2"));
        assert!(text.contains(r#"studio_relay_target_status{status="4xx"} 1"#));
        assert!(text.contains(r#"studio_relay_failures_total{kind="no_response"} 2"#));
        assert!(text.contains("studio_relay_bytes_out_total 30"));
        assert_eq!(m.failures(), (1, 2));
    }

    #[tokio::test]
    async fn test_nonstandard_status_not_counted_as_5xx() {
        let m = Metrics::new();
        m.record_envelope(503, 100, 0).await;
        m.record_envelope(600, 100, 0).await;
        m.record_envelope(999, 100, 0).await;

        let text = m.to_prometheus().await;
        assert!(text.contains("studio_relay_envelopes_total 3"));
        assert!(text.contains(r#"studio_relay_target_status{status="5xx"} 1"#));
        assert!(text.contains(r#"studio_relay_target_status{status="other"} 2"#));
    }
}
