use serde::{Deserialize, Serialize};

use super::{BBox, Detection, Frame, Track, TrackId, Tracker};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Frames a confirmed track may go unmatched before it is dropped.
    pub max_age: u32,
    /// Consecutive matches needed before a track is confirmed.
    pub n_init: u32,
    /// Minimum overlap for a detection to continue a track.
    pub iou_threshold: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_age: 30,
            n_init: 3,
            iou_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackPhase {
    Tentative,
    Confirmed,
}

#[derive(Debug, Clone)]
struct LiveTrack {
    id: TrackId,
    bbox: BBox,
    phase: TrackPhase,
    hits: u32,
    frames_since_update: u32,
}

/// Greedy IoU association with DeepSort lifecycle rules.
///
/// Tentative tracks are dropped on their first miss. Confirmed tracks survive
/// up to `max_age` misses and keep being reported at their last box while
/// they coast. Identities start at 1 and are never reused within a tracker.
pub struct IouTracker {
    settings: TrackerSettings,
    tracks: Vec<LiveTrack>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    fn associate(&self, detections: &[Detection]) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for (t_idx, track) in self.tracks.iter().enumerate() {
            for (d_idx, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.settings.iou_threshold {
                    candidates.push((iou, t_idx, d_idx));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_taken = vec![false; detections.len()];
        let mut matches = Vec::new();
        for (_, t_idx, d_idx) in candidates {
            if track_taken[t_idx] || det_taken[d_idx] {
                continue;
            }
            track_taken[t_idx] = true;
            det_taken[d_idx] = true;
            matches.push((t_idx, d_idx));
        }
        matches
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection], frame: &Frame) -> Vec<Track> {
        let matches = self.associate(detections);

        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; detections.len()];
        for &(t_idx, d_idx) in &matches {
            matched_tracks[t_idx] = true;
            matched_dets[d_idx] = true;

            let track = &mut self.tracks[t_idx];
            track.bbox = detections[d_idx].bbox;
            track.hits += 1;
            track.frames_since_update = 0;
            if track.phase == TrackPhase::Tentative && track.hits >= self.settings.n_init {
                track.phase = TrackPhase::Confirmed;
                log_debug!("track {} confirmed at frame {}", track.id, frame.index);
            }
        }

        for (t_idx, track) in self.tracks.iter_mut().enumerate() {
            if !matched_tracks[t_idx] {
                track.frames_since_update += 1;
            }
        }

        let max_age = self.settings.max_age;
        self.tracks.retain(|track| match track.phase {
            TrackPhase::Tentative => track.frames_since_update == 0,
            TrackPhase::Confirmed => track.frames_since_update <= max_age,
        });

        for (d_idx, det) in detections.iter().enumerate() {
            if matched_dets[d_idx] {
                continue;
            }
            let id = TrackId(self.next_id);
            self.next_id += 1;
            let phase = if self.settings.n_init <= 1 {
                TrackPhase::Confirmed
            } else {
                TrackPhase::Tentative
            };
            self.tracks.push(LiveTrack {
                id,
                bbox: det.bbox,
                phase,
                hits: 1,
                frames_since_update: 0,
            });
        }

        self.tracks
            .iter()
            .map(|track| Track {
                id: track.id,
                bbox: track.bbox,
                confirmed: track.phase == TrackPhase::Confirmed,
            })
            .collect()
    }
}
