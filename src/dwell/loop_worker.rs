use chrono::Local;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    metrics::{MetricsCollector, SampleMetrics},
    vision::{annotate::FrameAnnotator, Perception, StepError},
    zones::ZoneSet,
};

use super::DwellAccumulator;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Pacing and stop conditions for one run of the sampling loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub sample_interval: Duration,
    /// Log the running tally every this many samples.
    pub tally_every: u64,
    pub max_samples: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SourceEnded,
    SampleLimit,
    WorkerFailed,
}

/// Everything the loop hands back to the stop path.
pub struct LoopOutcome {
    pub accumulator: DwellAccumulator,
    pub samples: u64,
    pub reason: StopReason,
}

pub async fn sampling_loop(
    mut perception: Perception,
    zones: ZoneSet,
    mut accumulator: DwellAccumulator,
    metrics: MetricsCollector,
    annotator: Option<FrameAnnotator>,
    config: LoopConfig,
    cancel_token: CancellationToken,
) -> LoopOutcome {
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let tally_every = config.tally_every.max(1);
    let mut samples: u64 = 0;

    let reason = loop {
        if cancel_token.is_cancelled() {
            break StopReason::Cancelled;
        }
        if config.max_samples.is_some_and(|max| samples >= max) {
            break StopReason::SampleLimit;
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break StopReason::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        let cycle_start = Instant::now();
        let step = tokio::task::spawn_blocking(move || {
            let result = perception.step();
            (perception, result)
        })
        .await;

        let observation = match step {
            Ok((returned, result)) => {
                perception = returned;
                result
            }
            Err(join_err) => {
                log_error!("perception worker join failed: {join_err}");
                break StopReason::WorkerFailed;
            }
        };
        let perception_ms = cycle_start.elapsed().as_millis() as u64;

        let observation = match observation {
            Ok(observation) => observation,
            Err(StepError::Capture(err)) => {
                log_warn!("Failed to grab frame from camera: {err}");
                break StopReason::SourceEnded;
            }
            Err(StepError::Detect(err)) => {
                log_error!("detection failed, skipping sample: {err:#}");
                metrics.record_skip().await;
                continue;
            }
        };

        let now = Local::now();
        let mut confirmed = 0;
        let mut in_zone = 0;
        for track in observation.confirmed() {
            let inside = zones.contains(track.bbox.centroid());
            accumulator.sample(track.id, inside, now);
            confirmed += 1;
            if inside {
                in_zone += 1;
            }
        }

        if let Some(annotator) = &annotator {
            if let Err(err) = annotator.write(&observation.frame, &zones, &observation.tracks) {
                log_warn!("annotation failed for frame {}: {err:#}", observation.frame.index);
            }
        }

        samples += 1;

        let system = metrics.sample_system_metrics().await;
        metrics
            .record_sample(SampleMetrics {
                timestamp: now,
                frame_index: observation.frame.index,
                perception_ms,
                detections: observation.detections,
                confirmed_tracks: confirmed,
                in_zone,
                total_ms: cycle_start.elapsed().as_millis() as u64,
                cpu_percent: system.cpu_percent,
                memory_mb: system.memory_mb,
            })
            .await;

        if samples % tally_every == 0 {
            log_info!(
                "Time spent per person after {} samples: {}",
                samples,
                tally_summary(&accumulator)
            );
        }
    };

    log_info!("sampling loop stopped after {} samples ({:?})", samples, reason);

    LoopOutcome {
        accumulator,
        samples,
        reason,
    }
}

fn tally_summary(accumulator: &DwellAccumulator) -> String {
    if accumulator.is_empty() {
        return "nobody in zone yet".to_string();
    }
    accumulator.tally_lines().join(", ")
}
