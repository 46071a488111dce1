//! Readiness checks for the recording directories

use sensorlog_observability::{CheckStatus, ReadinessChecker};
use sensorlog_session::RecordingConfig;
use std::path::{Path, PathBuf};

/// Ready while the data (and archive) directories are writable directories
pub struct StorageReadiness {
    data_dir: PathBuf,
    archive_dir: Option<PathBuf>,
}

impl StorageReadiness {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            archive_dir: config.archive_dir.clone(),
        }
    }
}

impl ReadinessChecker for StorageReadiness {
    fn checks(&self) -> Vec<CheckStatus> {
        let mut checks = vec![check_dir("data_dir", &self.data_dir)];
        if let Some(dir) = &self.archive_dir {
            checks.push(check_dir("archive_dir", dir));
        }
        checks
    }
}

fn check_dir(name: &str, path: &Path) -> CheckStatus {
    match std::fs::metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            CheckStatus::failed(name, format!("{} is not a directory", path.display()))
        }
        Ok(meta) if meta.permissions().readonly() => {
            CheckStatus::failed(name, format!("{} is read-only", path.display()))
        }
        Ok(_) => CheckStatus::ok(name),
        Err(e) => CheckStatus::failed(name, format!("{}: {}", path.display(), e)),
    }
}
