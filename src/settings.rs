use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::dwell::AccrualPolicy;
use crate::vision::{TrackerSettings, PERSON_CLASS};
use crate::zones::{ZoneDefinition, ZoneSet};

pub const DEFAULT_SETTINGS_FILE: &str = "zonewatch.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub zones: Vec<ZoneDefinition>,
    /// Pause between capture cycles.
    pub sample_interval_ms: u64,
    /// Dwell credited per in-zone sample under the quantized policy.
    pub accrual_quantum_ms: u64,
    pub accrual_policy: AccrualPolicy,
    pub database_path: PathBuf,
    pub dashboard_path: PathBuf,
    pub target_classes: Vec<u32>,
    pub min_confidence: f32,
    pub tracker: TrackerSettings,
    pub blank_frame_size: FrameSize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            zones: vec![ZoneDefinition::rect("Desk Zone", 100, 100, 500, 400)],
            sample_interval_ms: 1000,
            accrual_quantum_ms: 1000,
            accrual_policy: AccrualPolicy::Quantized,
            database_path: PathBuf::from("productivity.db"),
            dashboard_path: PathBuf::from("dashboard.html"),
            target_classes: vec![PERSON_CLASS],
            min_confidence: 0.0,
            tracker: TrackerSettings::default(),
            blank_frame_size: FrameSize {
                width: 640,
                height: 480,
            },
        }
    }
}

impl MonitorSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn accrual_quantum(&self) -> Duration {
        Duration::from_millis(self.accrual_quantum_ms)
    }

    pub fn zone_set(&self) -> Result<ZoneSet> {
        ZoneSet::new(self.zones.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            bail!("sample_interval_ms must be greater than zero");
        }
        if self.accrual_quantum_ms == 0 {
            bail!("accrual_quantum_ms must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            bail!("min_confidence must be within 0.0..=1.0, got {}", self.min_confidence);
        }
        if self.tracker.n_init == 0 {
            bail!("tracker.n_init must be at least 1");
        }
        if self.blank_frame_size.width == 0 || self.blank_frame_size.height == 0 {
            bail!("blank_frame_size must be non-empty");
        }
        self.zone_set().map(|_| ())
    }
}

/// Settings backed by a JSON file. A missing file means defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_settings(&path)?
        } else {
            MonitorSettings::default()
        };
        data.validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> MonitorSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
        self.persist(&guard)
    }

    /// Write the current settings out, creating the file if needed.
    pub fn save(&self) -> Result<()> {
        let current = self.current();
        self.persist(&current)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn read_settings(path: &Path) -> Result<MonitorSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))
}
