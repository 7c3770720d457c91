mod types;

pub use types::{MetricsSnapshot, SampleMetrics, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_SAMPLES: usize = 20;

pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_samples: Vec<SampleMetrics>,
    sample_count: u64,
    skipped_count: u64,
    detection_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsState {
    fn refresh_system(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes, so take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_samples: Vec::with_capacity(MAX_RECENT_SAMPLES),
                sample_count: 0,
                skipped_count: 0,
                detection_count: 0,
                system,
                pid,
            })),
        }
    }

    /// Current process CPU and resident memory.
    pub async fn sample_system_metrics(&self) -> SystemMetrics {
        self.inner.lock().await.refresh_system()
    }

    pub async fn record_sample(&self, metrics: SampleMetrics) {
        let mut state = self.inner.lock().await;

        state.sample_count += 1;
        state.detection_count += metrics.detections as u64;
        state.recent_samples.push(metrics);

        if state.recent_samples.len() > MAX_RECENT_SAMPLES {
            state.recent_samples.remove(0);
        }
    }

    /// A frame was captured but could not be analysed.
    pub async fn record_skip(&self) {
        self.inner.lock().await.skipped_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.refresh_system();

        MetricsSnapshot {
            system,
            recent_samples: state.recent_samples.clone(),
            sample_count: state.sample_count,
            skipped_count: state.skipped_count,
            detection_count: state.detection_count,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.recent_samples.clear();
        state.sample_count = 0;
        state.skipped_count = 0;
        state.detection_count = 0;
        state.refresh_system();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
