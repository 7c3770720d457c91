use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timing and counts for one pass of the sampling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetrics {
    pub timestamp: DateTime<Local>,
    pub frame_index: u64,
    pub perception_ms: u64,
    pub detections: usize,
    pub confirmed_tracks: usize,
    pub in_zone: usize,
    pub total_ms: u64,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_samples: Vec<SampleMetrics>,
    pub sample_count: u64,
    pub skipped_count: u64,
    pub detection_count: u64,
}

impl MetricsSnapshot {
    pub fn mean_total_ms(&self) -> Option<f64> {
        if self.recent_samples.is_empty() {
            return None;
        }
        let sum: u64 = self.recent_samples.iter().map(|s| s.total_ms).sum();
        Some(sum as f64 / self.recent_samples.len() as f64)
    }
}
