use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::vision::TrackId;

/// How an in-zone sample turns into dwell time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualPolicy {
    /// Every in-zone sample credits one fixed quantum, however long ago the
    /// previous sample was. Accuracy depends on the loop keeping its pace.
    #[default]
    Quantized,
    /// Credits the wall-clock time between consecutive in-zone samples of
    /// the same identity. The entry sample itself credits nothing.
    Elapsed,
}

#[derive(Debug, Clone, Copy)]
struct Presence {
    entered_at: DateTime<Local>,
    /// Last in-zone sample; `Elapsed` credits from here.
    anchor: DateTime<Local>,
}

/// Per-session dwell bookkeeping.
///
/// An identity has a presence entry exactly when its most recent sample was
/// in-zone. Identities are created on first observation and never removed,
/// so totals survive a track leaving and coming back.
#[derive(Debug, Clone)]
pub struct DwellAccumulator {
    times: HashMap<TrackId, Duration>,
    entries: HashMap<TrackId, Presence>,
    policy: AccrualPolicy,
    quantum: Duration,
}

impl DwellAccumulator {
    pub fn new(policy: AccrualPolicy, quantum: Duration) -> Self {
        Self {
            times: HashMap::new(),
            entries: HashMap::new(),
            policy,
            quantum,
        }
    }

    pub fn quantized(quantum: Duration) -> Self {
        Self::new(AccrualPolicy::Quantized, quantum)
    }

    pub fn policy(&self) -> AccrualPolicy {
        self.policy
    }

    pub fn sample(&mut self, id: TrackId, in_zone: bool, now: DateTime<Local>) {
        if !in_zone {
            self.entries.remove(&id);
            return;
        }

        let previous = self.entries.get(&id).copied();
        let credit = match (self.policy, previous) {
            (AccrualPolicy::Quantized, _) => self.quantum,
            (AccrualPolicy::Elapsed, Some(presence)) => {
                (now - presence.anchor).to_std().unwrap_or_default()
            }
            (AccrualPolicy::Elapsed, None) => Duration::ZERO,
        };

        let entered_at = previous.map(|p| p.entered_at).unwrap_or(now);
        self.entries.insert(
            id,
            Presence {
                entered_at,
                anchor: now,
            },
        );

        let total = self.times.entry(id).or_default();
        *total = total.saturating_add(credit);
    }

    /// When the identity entered the zone, if it is there as of the last sample.
    pub fn entered_at(&self, id: TrackId) -> Option<DateTime<Local>> {
        self.entries.get(&id).map(|presence| presence.entered_at)
    }

    pub fn is_in_zone(&self, id: TrackId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn time_in_zone(&self, id: TrackId) -> Duration {
        self.times.get(&id).copied().unwrap_or_default()
    }

    pub fn identities(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Whole seconds per identity, fractional remainders dropped.
    pub fn totals_seconds(&self) -> BTreeMap<TrackId, u64> {
        self.times
            .iter()
            .map(|(id, duration)| (*id, duration.as_secs()))
            .collect()
    }

    /// `Person 7: 00:01:05` lines in identity order.
    pub fn tally_lines(&self) -> Vec<String> {
        self.totals_seconds()
            .into_iter()
            .map(|(id, secs)| format!("Person {id}: {}", crate::dashboard::format_hms(secs)))
            .collect()
    }
}
