// Job metrics module
//
// Lightweight counters for what the process did, logged on shutdown

use crate::services::locator::CompilerSource;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide job metrics
///
/// Uses atomic operations so the orchestrator, its detached cleanup tasks and
/// `main` can share one instance through an `Arc` without locks.
#[derive(Debug)]
pub struct JobMetrics {
    /// `run` requests that acquired the run flag
    pub jobs_started: AtomicUsize,

    /// `run` requests refused because a job was active
    pub jobs_rejected: AtomicUsize,

    /// Jobs that ended before dispatch
    pub jobs_aborted: AtomicUsize,

    /// Jobs whose commands reached a terminal
    pub jobs_dispatched: AtomicUsize,

    /// Compilers resolved per strategy
    pub resolved_configured: AtomicUsize,
    pub resolved_system_path: AtomicUsize,
    pub resolved_known_location: AtomicUsize,
    pub resolved_user_selected: AtomicUsize,

    /// Intermediate files deleted by cleanup
    pub artifacts_removed: AtomicUsize,

    /// Time from `run` to dispatch, summed over dispatched jobs
    pub total_dispatch_time_ms: AtomicU64,

    start_time: Instant,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self {
            jobs_started: AtomicUsize::new(0),
            jobs_rejected: AtomicUsize::new(0),
            jobs_aborted: AtomicUsize::new(0),
            jobs_dispatched: AtomicUsize::new(0),
            resolved_configured: AtomicUsize::new(0),
            resolved_system_path: AtomicUsize::new(0),
            resolved_known_location: AtomicUsize::new(0),
            resolved_user_selected: AtomicUsize::new(0),
            artifacts_removed: AtomicUsize::new(0),
            total_dispatch_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_aborted(&self) {
        self.jobs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched job and how long it took to get there
    pub fn record_job_dispatched(&self, elapsed: Duration) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        self.total_dispatch_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_compiler_resolved(&self, source: CompilerSource) {
        let counter = match source {
            CompilerSource::Configured => &self.resolved_configured,
            CompilerSource::SystemPath => &self.resolved_system_path,
            CompilerSource::KnownLocation => &self.resolved_known_location,
            CompilerSource::UserSelected => &self.resolved_user_selected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_artifacts_removed(&self, count: usize) {
        self.artifacts_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time from request to dispatch in milliseconds
    pub fn avg_dispatch_time_ms(&self) -> f64 {
        let total = self.total_dispatch_time_ms.load(Ordering::Relaxed);
        let count = self.jobs_dispatched.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Job Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Jobs: {} started, {} dispatched, {} aborted, {} rejected",
            self.jobs_started.load(Ordering::Relaxed),
            self.jobs_dispatched.load(Ordering::Relaxed),
            self.jobs_aborted.load(Ordering::Relaxed),
            self.jobs_rejected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Compilers resolved: {} configured, {} PATH, {} known location, {} user selected",
            self.resolved_configured.load(Ordering::Relaxed),
            self.resolved_system_path.load(Ordering::Relaxed),
            self.resolved_known_location.load(Ordering::Relaxed),
            self.resolved_user_selected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Artifacts removed: {}, avg time to dispatch: {:.2}ms",
            self.artifacts_removed.load(Ordering::Relaxed),
            self.avg_dispatch_time_ms()
        );
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}
