use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::services::vision::ParseSource;

/// Upstream latency samples kept for percentiles; older samples are dropped
pub const LATENCY_WINDOW: usize = 1000;

/// Process-wide counters for the analysis proxy.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Upstream model calls
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_tokens_input: AtomicU64,
    api_tokens_output: AtomicU64,
    api_latency_ms: RwLock<VecDeque<u64>>,

    // Analyze requests
    analyses_total: AtomicUsize,
    analyses_failed: AtomicUsize,
    json_replies: AtomicUsize,
    fallback_replies: AtomicUsize,
    empty_results: AtomicUsize,
    ingredients_returned: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,
    circuit_breaker_trips: AtomicUsize,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_tokens_input: AtomicU64::new(0),
                api_tokens_output: AtomicU64::new(0),
                api_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                analyses_total: AtomicUsize::new(0),
                analyses_failed: AtomicUsize::new(0),
                json_replies: AtomicUsize::new(0),
                fallback_replies: AtomicUsize::new(0),
                empty_results: AtomicUsize::new(0),
                ingredients_returned: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(&self, success: bool, duration: Duration, input_tokens: u64, output_tokens: u64) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.api_tokens_input.fetch_add(input_tokens, Ordering::Relaxed);
        self.inner.api_tokens_output.fetch_add(output_tokens, Ordering::Relaxed);
        let mut latency = self.inner.api_latency_ms.write();
        if latency.len() == LATENCY_WINDOW {
            latency.pop_front();
        }
        latency.push_back(duration.as_millis() as u64);
    }

    /// A completed analysis and how its reply was parsed
    pub fn record_analysis(&self, source: ParseSource, ingredient_count: usize) {
        self.inner.analyses_total.fetch_add(1, Ordering::Relaxed);
        match source {
            ParseSource::Json => self.inner.json_replies.fetch_add(1, Ordering::Relaxed),
            ParseSource::TextFallback => self.inner.fallback_replies.fetch_add(1, Ordering::Relaxed),
        };
        if ingredient_count == 0 {
            self.inner.empty_results.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .ingredients_returned
            .fetch_add(ingredient_count, Ordering::Relaxed);
    }

    pub fn record_analysis_failure(&self) {
        self.inner.analyses_total.fetch_add(1, Ordering::Relaxed);
        self.inner.analyses_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut api_latency: Vec<u64> = self.inner.api_latency_ms.read().iter().copied().collect();
        api_latency.sort_unstable();
        let api_latency_avg_ms = avg(&api_latency);
        let api_latency_p50_ms = percentile(&api_latency, 0.5);
        let api_latency_p95_ms = percentile(&api_latency, 0.95);
        let api_latency_p99_ms = percentile(&api_latency, 0.99);

        let mut endpoint_requests: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_tokens_input: self.inner.api_tokens_input.load(Ordering::Relaxed),
            api_tokens_output: self.inner.api_tokens_output.load(Ordering::Relaxed),
            api_latency_avg_ms,
            api_latency_p50_ms,
            api_latency_p95_ms,
            api_latency_p99_ms,
            analyses_total: self.inner.analyses_total.load(Ordering::Relaxed),
            analyses_failed: self.inner.analyses_failed.load(Ordering::Relaxed),
            json_replies: self.inner.json_replies.load(Ordering::Relaxed),
            fallback_replies: self.inner.fallback_replies.load(Ordering::Relaxed),
            empty_results: self.inner.empty_results.load(Ordering::Relaxed),
            ingredients_returned: self.inner.ingredients_returned.load(Ordering::Relaxed),
            endpoint_requests,
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = format!(
            r#"# HELP api_calls_total Total number of vision model calls
# TYPE api_calls_total counter
api_calls_total {}

# HELP api_calls_failed_total Vision model calls that failed
# TYPE api_calls_failed_total counter
api_calls_failed_total {}

# HELP api_tokens_input_total Prompt tokens consumed
# TYPE api_tokens_input_total counter
api_tokens_input_total {}

# HELP api_tokens_output_total Completion tokens generated
# TYPE api_tokens_output_total counter
api_tokens_output_total {}

# HELP api_latency_ms Vision model latency in milliseconds
# TYPE api_latency_ms gauge
api_latency_ms{{stat="avg"}} {}
api_latency_ms{{stat="p50"}} {}
api_latency_ms{{stat="p95"}} {}
api_latency_ms{{stat="p99"}} {}

# HELP analyses_total Analyze requests handled
# TYPE analyses_total counter
analyses_total{{outcome="failed"}} {}
analyses_total{{outcome="json"}} {}
analyses_total{{outcome="text_fallback"}} {}

# HELP empty_results_total Analyses that recognized no food
# TYPE empty_results_total counter
empty_results_total {}

# HELP ingredients_returned_total Ingredients returned across all analyses
# TYPE ingredients_returned_total counter
ingredients_returned_total {}

# HELP circuit_breaker_trips_total Times the upstream circuit opened
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}

# HELP http_requests_total Requests per endpoint
# TYPE http_requests_total counter
"#,
            s.api_calls_total,
            s.api_calls_failed,
            s.api_tokens_input,
            s.api_tokens_output,
            s.api_latency_avg_ms,
            s.api_latency_p50_ms,
            s.api_latency_p95_ms,
            s.api_latency_p99_ms,
            s.analyses_failed,
            s.json_replies,
            s.fallback_replies,
            s.empty_results,
            s.ingredients_returned,
            s.circuit_breaker_trips,
            s.uptime_seconds,
        );
        for (endpoint, count) in &s.endpoint_requests {
            out.push_str(&format!("http_requests_total{{endpoint=\"{}\"}} {}\n", endpoint, count));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_tokens_input: u64,
    pub api_tokens_output: u64,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub api_latency_p99_ms: u64,
    pub analyses_total: usize,
    pub analyses_failed: usize,
    pub json_replies: usize,
    pub fallback_replies: usize,
    pub empty_results: usize,
    pub ingredients_returned: usize,
    pub endpoint_requests: Vec<(String, usize)>,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

/// `sorted` must be in ascending order
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
