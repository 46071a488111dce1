//! Session recording configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Directory holding one sub-directory of device logs per live session
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep a copy of every session archive here (None = only return it)
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Largest number of samples accepted in one ingest call
    #[serde(default = "default_max_batch_samples")]
    pub max_batch_samples: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_dir: None,
            max_batch_samples: default_max_batch_samples(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_batch_samples() -> usize {
    10_000
}

impl RecordingConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Where a force-closed session's archive is written on shutdown
    pub fn shutdown_archive_dir(&self) -> &Path {
        self.archive_dir.as_deref().unwrap_or(&self.data_dir)
    }

    /// Validate the recording configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }

        if let Some(dir) = &self.archive_dir
            && dir.as_os_str().is_empty()
        {
            return Err("archive_dir must not be empty when set".to_string());
        }

        if self.max_batch_samples == 0 {
            return Err("max_batch_samples must be at least 1".to_string());
        }

        Ok(())
    }
}
