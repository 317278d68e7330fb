//! Request metrics and periodic summaries for the inference service.

use crate::audit::PipelineWarning;
use crate::types::prediction::{PredictionOutcome, RiskCategory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is discarded
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector shared by all request handlers
pub struct PipelineMetrics {
    /// Patient records scored
    pub predictions: AtomicU64,
    /// Requests that failed after validation
    pub failures: AtomicU64,
    /// Requests rejected by validation or decoding
    pub rejections: AtomicU64,
    /// Outcomes by risk category
    by_category: RwLock<HashMap<RiskCategory, u64>>,
    /// P(GDM) distribution in tenths
    probability_buckets: RwLock<[u64; 10]>,
    /// Recovered pipeline problems by kind
    warnings_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            by_category: RwLock::new(HashMap::new()),
            probability_buckets: RwLock::new([0; 10]),
            warnings_by_kind: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored request
    pub fn record_success(
        &self,
        latency: Duration,
        outcomes: &[PredictionOutcome],
        warnings: &[PipelineWarning],
    ) {
        self.predictions
            .fetch_add(outcomes.len() as u64, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_category) = self.by_category.write() {
            for outcome in outcomes {
                *by_category.entry(outcome.risk_category).or_insert(0) += 1;
            }
        }

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for outcome in outcomes {
                let bucket = (outcome.gdm_probability * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }

        if !warnings.is_empty() {
            if let Ok(mut by_kind) = self.warnings_by_kind.write() {
                for warning in warnings {
                    *by_kind.entry(warning.kind()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Record a request that failed inside the pipeline
    pub fn record_failure(&self, latency: Duration, kind: &'static str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    /// Record a request rejected before reaching the pipeline
    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > MAX_LATENCY_SAMPLES {
                times.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    /// Latency statistics over the retained samples
    pub fn latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records scored per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn category_counts(&self) -> HashMap<RiskCategory, u64> {
        self.by_category
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn warning_counts(&self) -> HashMap<&'static str, u64> {
        self.warnings_by_kind
            .read()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn failure_counts(&self) -> HashMap<&'static str, u64> {
        self.failures_by_kind
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let rejections = self.rejections.load(Ordering::Relaxed);
        let latency = self.latency_stats();
        let throughput = self.throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              GDM INFERENCE SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>8}  │  Throughput: {:>6.1} rec/s          ║",
            predictions, throughput
        );
        info!(
            "║ Failed: {:>8}  │  Rejected: {:>8}                         ║",
            failures, rejections
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}   ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Outcomes by Risk Category:                                   ║");
        let categories = self.category_counts();
        for category in [RiskCategory::Low, RiskCategory::Moderate, RiskCategory::High] {
            let count = categories.get(&category).copied().unwrap_or(0);
            let pct = if predictions > 0 {
                (count as f64 / predictions as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:14}: {:>6} ({:>5.1}%)", category.as_str(), count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ P(GDM) Distribution:                                         ║");
        let dist = self.probability_distribution();
        let total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let warnings = self.warning_counts();
        if !warnings.is_empty() {
            info!("Pipeline warnings:");
            for (kind, count) in &warnings {
                info!("  {}: {}", kind, count);
            }
        }
        let failures = self.failure_counts();
        if !failures.is_empty() {
            info!("Failures:");
            for (kind, count) in &failures {
                info!("  {}: {}", kind, count);
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
