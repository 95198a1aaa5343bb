//! Pipeline configuration.
//!
//! One JSON file bundles the calendar geometry, the dedup type ordering,
//! and the override rule table. The config is loaded once and passed
//! explicitly into the components that need it; nothing reads it as
//! ambient state. A missing file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarConfig;
use crate::classifier::OverrideEntry;
use crate::dedup::TypePriority;
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub calendar: CalendarConfig,
    pub type_priority: TypePriority,
    /// Pinned classification corrections, highest precedence.
    pub overrides: Vec<OverrideEntry>,
}

impl PipelineConfig {
    /// Default config file location: `~/.commtask/config.json`.
    pub fn default_path() -> Result<PathBuf, PipelineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| PipelineError::Config("home directory not found".into()))?;
        Ok(home.join(".commtask").join("config.json"))
    }

    /// Load a config file; absent files yield the defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the config as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Sanity checks on calendar geometry. Run after load; a bad config is
    /// a caller error, not something to silently patch.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.calendar.ticks_per_hour <= 0 {
            return Err(PipelineError::Config("ticksPerHour must be positive".into()));
        }
        if self.calendar.work_start_hour >= self.calendar.work_end_hour {
            return Err(PipelineError::Config(
                "workStartHour must be before workEndHour".into(),
            ));
        }
        Ok(())
    }
}
