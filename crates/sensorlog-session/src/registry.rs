//! Device registry for one recording session

use dashmap::DashMap;
use sensorlog_core::SessionEpoch;
use sensorlog_storage::DeviceStream;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-device view used by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub columns: Vec<String>,
    pub rows: u64,
}

/// `device_id -> DeviceStream` for a single session
///
/// Entries are never removed; the whole registry is dropped when the
/// session stops.
pub struct SessionRegistry {
    session_dir: PathBuf,
    version: u64,
    epoch: Arc<SessionEpoch>,
    streams: DashMap<String, Arc<DeviceStream>>,
}

impl SessionRegistry {
    pub fn new(session_dir: impl Into<PathBuf>, version: u64, epoch: Arc<SessionEpoch>) -> Self {
        Self {
            session_dir: session_dir.into(),
            version,
            epoch,
            streams: DashMap::new(),
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Return the device's stream, creating it with `candidate_schema` if new
    ///
    /// An existing stream is returned unchanged; later schemas are checked by
    /// the stream on append, not here.
    pub fn get_or_create(
        &self,
        device_id: &str,
        candidate_schema: Vec<String>,
    ) -> Arc<DeviceStream> {
        if let Some(stream) = self.streams.get(device_id) {
            return Arc::clone(stream.value());
        }

        let entry = self.streams.entry(device_id.to_string()).or_insert_with(|| {
            tracing::debug!(
                device_id = %device_id,
                columns = ?candidate_schema,
                "Registering device stream"
            );
            Arc::new(DeviceStream::new(
                device_id,
                candidate_schema,
                self.session_dir.join(format!("{}.csv", device_id)),
                self.version,
                Arc::clone(&self.epoch),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Snapshot of all streams, ordered by device ID
    pub fn streams(&self) -> Vec<Arc<DeviceStream>> {
        let mut streams: Vec<_> = self.streams.iter().map(|s| Arc::clone(s.value())).collect();
        streams.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        streams
    }

    /// Devices that have written at least one row
    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.streams()
            .into_iter()
            .filter(|s| s.row_count() > 0)
            .map(|s| DeviceSummary {
                device_id: s.device_id().to_string(),
                columns: s.schema(),
                rows: s.row_count(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
