//! Metrics for docsync
//!
//! Emitted through the `metrics` facade; the binary decides on an exporter.

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Metric names as constants for consistency
pub mod names {
    pub const DOCS_IMPORTED: &str = "docsync_documents_imported_total";
    pub const DOCS_FAILED: &str = "docsync_documents_failed_total";
    pub const DOCS_SKIPPED: &str = "docsync_documents_skipped_total";
    pub const IMPORT_REQUESTS: &str = "docsync_import_requests_total";
    pub const IMPORT_LATENCY: &str = "docsync_import_latency_seconds";
    pub const IMPORT_RETRIES: &str = "docsync_import_retries_total";
    pub const PAGE_FETCH_LATENCY: &str = "docsync_page_fetch_latency_seconds";
    pub const DOCUMENT_WRITES: &str = "docsync_document_writes_total";
    pub const RUNS_TOTAL: &str = "docsync_runs_total";
    pub const RUN_ERRORS: &str = "docsync_run_errors";
}

/// Labels for metrics
pub mod labels {
    pub const COMPONENT: &str = "component";
    pub const TARGET: &str = "target";
    pub const OPERATION: &str = "operation";
    pub const STATUS: &str = "status";
}

/// Handle for recording synchronizer metrics
#[derive(Clone)]
pub struct SyncMetrics {
    component: String,
}

impl SyncMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record documents accepted by a bulk import
    pub fn record_imported(&self, count: u64, target: &str) {
        counter!(
            names::DOCS_IMPORTED,
            labels::COMPONENT => self.component.clone(),
            labels::TARGET => target.to_string(),
        )
        .increment(count);
    }

    /// Record documents rejected inside a bulk import
    pub fn record_failed(&self, count: u64, target: &str) {
        counter!(
            names::DOCS_FAILED,
            labels::COMPONENT => self.component.clone(),
            labels::TARGET => target.to_string(),
        )
        .increment(count);
    }

    /// Record group-query documents outside the route pattern
    pub fn record_skipped(&self, count: u64, target: &str) {
        counter!(
            names::DOCS_SKIPPED,
            labels::COMPONENT => self.component.clone(),
            labels::TARGET => target.to_string(),
        )
        .increment(count);
    }

    /// Record a bulk import request by outcome ("ok", "partial", "error")
    pub fn record_import_request(&self, status: &str) {
        counter!(
            names::IMPORT_REQUESTS,
            labels::COMPONENT => self.component.clone(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    pub fn record_import_latency(&self, duration: Duration) {
        histogram!(
            names::IMPORT_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_retry(&self) {
        counter!(
            names::IMPORT_RETRIES,
            labels::COMPONENT => self.component.clone(),
        )
        .increment(1);
    }

    pub fn record_page_fetch_latency(&self, duration: Duration) {
        histogram!(
            names::PAGE_FETCH_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Record a single-document write ("upsert", "delete")
    pub fn record_document_write(&self, operation: &str, status: &str) {
        counter!(
            names::DOCUMENT_WRITES,
            labels::COMPONENT => self.component.clone(),
            labels::OPERATION => operation.to_string(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Record a finished run and its error total
    pub fn record_run(&self, status: &str, errors: usize) {
        counter!(
            names::RUNS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
        gauge!(
            names::RUN_ERRORS,
            labels::COMPONENT => self.component.clone(),
        )
        .set(errors as f64);
    }
}

/// Timer guard for automatic latency recording
pub struct LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    pub fn start(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and record
    pub fn stop(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(f) = self.on_drop.take() {
            f(elapsed);
        }
        elapsed
    }
}

impl<F> Drop for LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorded = Cell::new(None);
        {
            let _timer = LatencyTimer::start(|d| recorded.set(Some(d)));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recorded.get().unwrap() >= Duration::from_millis(5));
    }

    #[test]
    fn test_latency_timer_records_once() {
        let calls = Cell::new(0);
        let timer = LatencyTimer::start(|_| calls.set(calls.get() + 1));
        timer.stop();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_metrics_without_recorder() {
        // No recorder installed: calls are no-ops
        let metrics = SyncMetrics::new("test");
        metrics.record_imported(3, "users_index");
        metrics.record_run("completed", 0);
    }
}
