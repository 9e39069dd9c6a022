use extract::FailureKind;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for one pipeline run.
#[derive(Default)]
pub struct RunMetrics {
    blocks_attempted: AtomicUsize,
    blocks_succeeded: AtomicUsize,
    malformed_inputs: AtomicUsize,
    timeouts: AtomicUsize,
    model_errors: AtomicUsize,
    sanitize_failures: AtomicUsize,
    batches_completed: AtomicUsize,
    checkpoint_failures: AtomicUsize,
    model_calls: AtomicUsize,

    // Timing (in microseconds)
    total_call_time_us: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the final outcome of one block, after any retries.
    pub fn record_block(&self, failure: Option<FailureKind>) {
        self.blocks_attempted.fetch_add(1, Ordering::Relaxed);
        let counter = match failure {
            None => &self.blocks_succeeded,
            Some(FailureKind::MalformedInput) => &self.malformed_inputs,
            Some(FailureKind::Timeout) => &self.timeouts,
            Some(FailureKind::ModelError) => &self.model_errors,
            Some(FailureKind::SanitizeFailure) => &self.sanitize_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one model call. Retry backoff is not part of `duration`.
    pub fn record_call(&self, duration: Duration) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        self.total_call_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self, checkpoint_saved: bool) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        if !checkpoint_saved {
            self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let model_calls = self.model_calls.load(Ordering::Relaxed);

        MetricsSnapshot {
            blocks_attempted: self.blocks_attempted.load(Ordering::Relaxed),
            blocks_succeeded: self.blocks_succeeded.load(Ordering::Relaxed),
            malformed_inputs: self.malformed_inputs.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            model_errors: self.model_errors.load(Ordering::Relaxed),
            sanitize_failures: self.sanitize_failures.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            model_calls,
            avg_call_time_ms: avg_time_ms(&self.total_call_time_us, model_calls),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_attempted: usize,
    pub blocks_succeeded: usize,
    pub malformed_inputs: usize,
    pub timeouts: usize,
    pub model_errors: usize,
    pub sanitize_failures: usize,
    pub batches_completed: usize,
    pub checkpoint_failures: usize,
    pub model_calls: usize,
    pub avg_call_time_ms: f64,
}

impl MetricsSnapshot {
    /// Failures charged to the model; malformed input is not one of them.
    pub fn model_failures(&self) -> usize {
        self.timeouts + self.model_errors + self.sanitize_failures
    }
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_failure_kind() {
        let metrics = RunMetrics::new();
        metrics.record_call(Duration::from_millis(10));
        metrics.record_block(None);
        metrics.record_call(Duration::from_millis(30));
        metrics.record_block(Some(FailureKind::Timeout));
        metrics.record_block(Some(FailureKind::MalformedInput));
        metrics.record_batch(true);
        metrics.record_batch(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_attempted, 3);
        assert_eq!(snapshot.blocks_succeeded, 1);
        assert_eq!(snapshot.malformed_inputs, 1);
        assert_eq!(snapshot.model_failures(), 1);
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.checkpoint_failures, 1);
        assert_eq!(snapshot.model_calls, 2);
        assert!((snapshot.avg_call_time_ms - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_average_is_per_call_not_per_block() {
        let metrics = RunMetrics::new();
        // one block, retried once
        metrics.record_call(Duration::from_millis(40));
        metrics.record_call(Duration::from_millis(20));
        metrics.record_block(None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_attempted, 1);
        assert_eq!(snapshot.model_calls, 2);
        assert!((snapshot.avg_call_time_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_run_has_zero_average() {
        assert_eq!(RunMetrics::new().snapshot().avg_call_time_ms, 0.0);
    }
}
