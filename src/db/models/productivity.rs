//! Durable per-identity dwell totals.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::vision::TrackId;

/// One row of the `productivity` table.
///
/// `time_spent_seconds` only ever grows: every flush adds the session total
/// to whatever was stored before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductivityRecord {
    pub person_id: TrackId,
    pub time_spent_seconds: u64,
    pub last_updated: NaiveDateTime,
}
