use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for provisioning metrics (Prometheus, StatsD, logs).
pub trait MetricsBackend: Send + Sync {
    fn record_counter(&self, name: &str, value: u64);
    fn record_gauge(&self, name: &str, value: f64);
}

/// Atomic counters for one process.
pub struct ProvisionMetrics {
    pub workspaces_created: AtomicU64,
    pub runs_started: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
    pub status_polls: AtomicU64,
    pub poll_timeouts: AtomicU64,
    pub outputs_returned: AtomicU64,
    backend: Option<Arc<dyn MetricsBackend>>,
}

impl std::fmt::Debug for ProvisionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionMetrics")
            .field("snapshot", &self.snapshot())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

impl Default for ProvisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionMetrics {
    pub fn new() -> Self {
        Self {
            workspaces_created: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            status_polls: AtomicU64::new(0),
            poll_timeouts: AtomicU64::new(0),
            outputs_returned: AtomicU64::new(0),
            backend: None,
        }
    }

    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new()
        }
    }

    fn bump(&self, counter: &AtomicU64, by: u64, name: &str) {
        let val = counter.fetch_add(by, Ordering::Relaxed) + by;
        if let Some(backend) = &self.backend {
            backend.record_counter(name, val);
        }
    }

    pub fn record_workspace_created(&self) {
        self.bump(&self.workspaces_created, 1, "tfprov.workspaces_created");
    }

    pub fn record_run_started(&self) {
        self.bump(&self.runs_started, 1, "tfprov.runs_started");
    }

    pub fn record_run_succeeded(&self) {
        self.bump(&self.runs_succeeded, 1, "tfprov.runs_succeeded");
    }

    pub fn record_run_failed(&self) {
        self.bump(&self.runs_failed, 1, "tfprov.runs_failed");
    }

    pub fn record_poll(&self) {
        self.bump(&self.status_polls, 1, "tfprov.status_polls");
    }

    pub fn record_poll_timeout(&self) {
        self.bump(&self.poll_timeouts, 1, "tfprov.poll_timeouts");
    }

    pub fn record_outputs(&self, count: usize) {
        self.bump(&self.outputs_returned, count as u64, "tfprov.outputs_returned");
        if let Some(backend) = &self.backend {
            backend.record_gauge("tfprov.last_output_count", count as f64);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workspaces_created: self.workspaces_created.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            status_polls: self.status_polls.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            outputs_returned: self.outputs_returned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub workspaces_created: u64,
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub status_polls: u64,
    pub poll_timeouts: u64,
    pub outputs_returned: u64,
}

/// Emits every metric as a structured log event.
pub struct LoggingMetricsBackend;

impl MetricsBackend for LoggingMetricsBackend {
    fn record_counter(&self, name: &str, value: u64) {
        tracing::debug!(metric = name, value, kind = "counter", "metric");
    }

    fn record_gauge(&self, name: &str, value: f64) {
        tracing::debug!(metric = name, value, kind = "gauge", "metric");
    }
}
