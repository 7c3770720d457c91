use std::{collections::BTreeMap, future::Future};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use log::{error, info};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::Database,
    metrics::MetricsCollector,
    vision::{annotate::FrameAnnotator, Perception, TrackId},
    zones::ZoneSet,
};

use super::{
    loop_worker::{sampling_loop, LoopConfig, LoopOutcome, StopReason},
    DwellAccumulator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Running,
}

/// What a session contributed once it was flushed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub session_id: String,
    pub started_at: DateTime<Local>,
    pub stopped_at: DateTime<Local>,
    pub samples: u64,
    pub rows_written: usize,
    pub totals: BTreeMap<TrackId, u64>,
}

struct ActiveSession {
    id: String,
    started_at: DateTime<Local>,
    handle: JoinHandle<LoopOutcome>,
    cancel_token: CancellationToken,
}

/// Start/stop control for a sampling session.
///
/// `start` hands a fresh accumulator to the loop task; `stop` cancels the
/// task, takes the accumulator back and merges it into the store.
pub struct SessionController {
    db: Database,
    metrics: MetricsCollector,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(db: Database, metrics: MetricsCollector) -> Self {
        Self {
            db,
            metrics,
            active: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.active {
            Some(_) => SessionStatus::Running,
            None => SessionStatus::Idle,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|session| session.id.as_str())
    }

    pub async fn start(
        &mut self,
        perception: Perception,
        zones: ZoneSet,
        accumulator: DwellAccumulator,
        annotator: Option<FrameAnnotator>,
        config: LoopConfig,
    ) -> Result<String> {
        if self.active.is_some() {
            bail!("session already running");
        }

        self.metrics.reset().await;

        let session_id = Uuid::new_v4().to_string();
        let started_at = Local::now();
        let cancel_token = CancellationToken::new();

        info!(
            "Starting session {session_id} ({} zones, {:?} policy, every {:?})",
            zones.len(),
            accumulator.policy(),
            config.sample_interval
        );

        let handle = tokio::spawn(sampling_loop(
            perception,
            zones,
            accumulator,
            self.metrics.clone(),
            annotator,
            config,
            cancel_token.clone(),
        ));

        self.active = Some(ActiveSession {
            id: session_id.clone(),
            started_at,
            handle,
            cancel_token,
        });
        Ok(session_id)
    }

    /// Cancel the running loop and flush what it accumulated.
    pub async fn stop(&mut self) -> Result<FlushReport> {
        let session = self
            .active
            .take()
            .ok_or_else(|| anyhow!("no active session to stop"))?;
        session.cancel_token.cancel();
        let outcome = session
            .handle
            .await
            .context("sampling loop task failed to join")?;
        self.finish(session.id, session.started_at, outcome).await
    }

    /// Keep the session running until `shutdown` resolves or the loop ends
    /// on its own, then flush.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<FlushReport>
    where
        F: Future<Output = ()>,
    {
        let finished = {
            let session = self
                .active
                .as_mut()
                .ok_or_else(|| anyhow!("no active session to run"))?;

            tokio::select! {
                joined = &mut session.handle => Some(joined),
                _ = shutdown => None,
            }
        };

        match finished {
            Some(joined) => {
                let session = self
                    .active
                    .take()
                    .ok_or_else(|| anyhow!("session vanished while running"))?;
                let outcome = joined.context("sampling loop task failed to join")?;
                self.finish(session.id, session.started_at, outcome).await
            }
            None => {
                info!("Stop requested");
                self.stop().await
            }
        }
    }

    async fn finish(
        &mut self,
        session_id: String,
        started_at: DateTime<Local>,
        outcome: LoopOutcome,
    ) -> Result<FlushReport> {
        let stopped_at = Local::now();
        let totals = outcome.accumulator.totals_seconds();

        if outcome.reason == StopReason::WorkerFailed {
            error!("Session {session_id} ended on a perception failure; flushing what was collected");
        }

        let snapshot = self.metrics.get_snapshot().await;
        info!(
            "Session {session_id}: {} samples, {} skipped, {} detections, mean cycle {:.1}ms, cpu {:.1}%, mem {:.1}MB",
            snapshot.sample_count,
            snapshot.skipped_count,
            snapshot.detection_count,
            snapshot.mean_total_ms().unwrap_or(0.0),
            snapshot.system.cpu_percent,
            snapshot.system.memory_mb
        );

        let rows_written = match self
            .db
            .flush_dwell_totals(totals.clone(), stopped_at.naive_local())
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                let unsaved = totals
                    .iter()
                    .map(|(id, secs)| format!("{id}={secs}s"))
                    .collect::<Vec<_>>()
                    .join(", ");
                error!("Session {session_id} flush failed; unsaved totals: {unsaved}");
                return Err(anyhow::Error::new(err).context(format!(
                    "failed to save session {session_id} to {} (unsaved: {unsaved})",
                    self.db.path().display()
                )));
            }
        };

        info!("Session {session_id} saved {rows_written} identities");

        Ok(FlushReport {
            session_id,
            started_at,
            stopped_at,
            samples: outcome.samples,
            rows_written,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::scripted::{confirmed_at, scripted_perception};
    use crate::zones::ZoneDefinition;
    use std::time::Duration;

    fn desk() -> ZoneSet {
        ZoneSet::new(vec![ZoneDefinition::rect("Desk Zone", 100, 100, 500, 400)]).unwrap()
    }

    fn config() -> LoopConfig {
        LoopConfig {
            sample_interval: Duration::from_millis(1),
            tally_every: 10,
            max_samples: None,
        }
    }

    fn five_in_then_out() -> Perception {
        let mut script = vec![vec![confirmed_at(7, 300, 250)]; 5];
        script.push(vec![confirmed_at(7, 50, 50)]);
        scripted_perception(script)
    }

    async fn run_session(controller: &mut SessionController) -> FlushReport {
        controller
            .start(
                five_in_then_out(),
                desk(),
                DwellAccumulator::quantized(Duration::from_secs(1)),
                None,
                config(),
            )
            .await
            .unwrap();
        assert_eq!(controller.status(), SessionStatus::Running);
        controller
            .run_until(std::future::pending::<()>())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sessions_add_up_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("productivity.db")).unwrap();
        let mut controller = SessionController::new(db.clone(), MetricsCollector::new());

        let first = run_session(&mut controller).await;
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(first.samples, 6);
        assert_eq!(first.rows_written, 1);
        assert_eq!(first.totals, BTreeMap::from([(TrackId(7), 5)]));
        let record = db.get_productivity_record(TrackId(7)).await.unwrap().unwrap();
        assert_eq!(record.time_spent_seconds, 5);

        let second = run_session(&mut controller).await;
        assert_ne!(first.session_id, second.session_id);
        let record = db.get_productivity_record(TrackId(7)).await.unwrap().unwrap();
        assert_eq!(record.time_spent_seconds, 10);
    }

    #[tokio::test]
    async fn stop_flushes_partial_session() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("productivity.db")).unwrap();
        let mut controller = SessionController::new(db.clone(), MetricsCollector::new());

        let slow = LoopConfig {
            sample_interval: Duration::from_millis(20),
            tally_every: 1,
            max_samples: None,
        };
        controller
            .start(
                scripted_perception(vec![vec![confirmed_at(2, 200, 200)]; 10_000]),
                desk(),
                DwellAccumulator::quantized(Duration::from_secs(1)),
                None,
                slow,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = controller.stop().await.unwrap();

        assert!(report.samples >= 1);
        assert!(report.samples < 10_000);
        let stored = db.get_productivity_record(TrackId(2)).await.unwrap().unwrap();
        assert_eq!(stored.time_spent_seconds, report.samples);
    }

    #[tokio::test]
    async fn start_twice_is_refused_and_stop_when_idle_errors() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("productivity.db")).unwrap();
        let mut controller = SessionController::new(db, MetricsCollector::new());

        assert!(controller.stop().await.is_err());

        controller
            .start(
                five_in_then_out(),
                desk(),
                DwellAccumulator::quantized(Duration::from_secs(1)),
                None,
                config(),
            )
            .await
            .unwrap();
        assert!(controller.session_id().is_some());
        assert!(controller
            .start(
                five_in_then_out(),
                desk(),
                DwellAccumulator::quantized(Duration::from_secs(1)),
                None,
                config(),
            )
            .await
            .is_err());

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_stops_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("productivity.db")).unwrap();
        let mut controller = SessionController::new(db.clone(), MetricsCollector::new());

        controller
            .start(
                scripted_perception(vec![vec![confirmed_at(4, 150, 150)]; 10_000]),
                desk(),
                DwellAccumulator::quantized(Duration::from_secs(1)),
                None,
                LoopConfig {
                    sample_interval: Duration::from_millis(10),
                    tally_every: 100,
                    max_samples: None,
                },
            )
            .await
            .unwrap();

        let report = controller
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();
        assert_eq!(controller.status(), SessionStatus::Idle);
        let stored = db.get_total_tracked_seconds().await.unwrap();
        assert_eq!(stored, report.totals.values().sum::<u64>());
    }
}
