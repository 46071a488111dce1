//! Session recorder
//!
//! `SessionRecorder` is the contract the HTTP boundary calls into: start and
//! stop a recording session, query its status, and ingest device batches.
//! Ingesting while idle is not an error; the batch is dropped and reported
//! with `written = 0` so devices can keep sending unconditionally.

use crate::config::RecordingConfig;
use crate::controller::{FinishedSession, SessionController};
use crate::registry::DeviceSummary;
use sensorlog_core::{Error, Result, Sample, SessionId, format_timestamp, validate_device_id};
use sensorlog_storage::{Archiver, SessionArchive, StorageError};
use serde::Serialize;
use serde_json::Value;

/// Response to `start_session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStarted {
    pub session_id: SessionId,
    /// Session start as Unix seconds, the shared time base for devices
    pub start_epoch: i64,
    pub start_time_utc: String,
    pub already_running: bool,
}

/// Response to `stop_session`
#[derive(Debug, Clone)]
pub struct SessionStopped {
    pub session_id: SessionId,
    pub archive: SessionArchive,
}

/// Response to `query_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub logging: bool,
    pub start_epoch: Option<i64>,
    pub start_time_utc: Option<String>,
    pub session_id: Option<SessionId>,
}

/// Why a well-formed batch was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    LoggingDisabled,
}

/// Response to `ingest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub written: usize,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DropReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl IngestOutcome {
    fn stored(written: usize, session_id: SessionId) -> Self {
        Self {
            written,
            stored: true,
            reason: None,
            session_id: Some(session_id),
        }
    }

    fn dropped(reason: DropReason) -> Self {
        Self {
            written: 0,
            stored: false,
            reason: Some(reason),
            session_id: None,
        }
    }
}

/// Recording service: controller + registry + archiver
pub struct SessionRecorder {
    config: RecordingConfig,
    controller: SessionController,
    archiver: Archiver,
}

impl SessionRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        let archiver = match &config.archive_dir {
            Some(dir) => Archiver::with_archive_dir(dir),
            None => Archiver::new(),
        };

        Self {
            controller: SessionController::new(config.data_dir.clone()),
            archiver,
            config,
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Start a session, or return the one already recording
    pub fn start_session(&self) -> SessionStarted {
        let outcome = self.controller.start();
        SessionStarted {
            start_epoch: outcome.started_at.timestamp(),
            start_time_utc: format_timestamp(&outcome.started_at),
            session_id: outcome.session_id,
            already_running: outcome.already_running,
        }
    }

    /// Stop the session and package its archive
    pub fn stop_session(&self) -> Result<SessionStopped> {
        let finished = self.controller.stop()?;
        self.package(&self.archiver, finished)
    }

    /// Force-close a session still recording at shutdown
    ///
    /// The archive is always persisted, to the archive directory if one is
    /// configured and to the data directory otherwise.
    pub fn shutdown(&self) -> Result<Option<SessionStopped>> {
        let finished = match self.controller.stop() {
            Ok(finished) => finished,
            Err(Error::NoActiveSession) => return Ok(None),
            Err(e) => return Err(e),
        };

        tracing::warn!(
            session_id = %finished.session_id,
            "Force-closing recording session at shutdown"
        );

        let archiver = Archiver::with_archive_dir(self.config.shutdown_archive_dir());
        self.package(&archiver, finished).map(Some)
    }

    /// Whether a session is recording, and since when
    pub fn query_status(&self) -> StatusReport {
        let snapshot = self.controller.status();
        StatusReport {
            logging: snapshot.status.is_recording(),
            start_epoch: snapshot.started_at.map(|t| t.timestamp()),
            start_time_utc: snapshot.started_at.as_ref().map(format_timestamp),
            session_id: snapshot.session_id,
        }
    }

    /// Devices that have stored rows in the current session
    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.controller
            .current()
            .map(|active| active.registry().devices())
            .unwrap_or_default()
    }

    /// Ingest a batch of JSON samples for one device
    pub fn ingest(&self, device_id: &str, samples: Vec<Value>) -> Result<IngestOutcome> {
        self.check_batch(device_id, samples.len())?;
        let samples = samples
            .into_iter()
            .map(Sample::from_json)
            .collect::<Result<Vec<_>>>()?;
        self.ingest_validated(device_id, samples)
    }

    fn check_batch(&self, device_id: &str, len: usize) -> Result<()> {
        validate_device_id(device_id)?;

        if len == 0 {
            return Err(Error::InvalidPayload(
                "samples must contain at least one sample".to_string(),
            ));
        }

        if len > self.config.max_batch_samples {
            return Err(Error::InvalidPayload(format!(
                "batch of {} samples exceeds the limit of {}",
                len, self.config.max_batch_samples
            )));
        }

        Ok(())
    }

    fn ingest_validated(&self, device_id: &str, samples: Vec<Sample>) -> Result<IngestOutcome> {
        let Some(session) = self.controller.current() else {
            tracing::trace!(device_id = %device_id, "Dropping batch, logging disabled");
            return Ok(IngestOutcome::dropped(DropReason::LoggingDisabled));
        };

        let stream = session
            .registry()
            .get_or_create(device_id, Sample::candidate_schema(&samples));

        match stream.append(&samples) {
            Ok(written) => Ok(IngestOutcome::stored(written, session.id().clone())),
            // Session stopped between the snapshot and the write
            Err(StorageError::StreamRetired { .. }) => {
                tracing::debug!(
                    session_id = %session.id(),
                    device_id = %device_id,
                    "Dropping batch for stopped session"
                );
                Ok(IngestOutcome::dropped(DropReason::LoggingDisabled))
            }
            Err(e) => {
                if !matches!(e, StorageError::SchemaMismatch { .. }) {
                    tracing::error!(
                        session_id = %session.id(),
                        device_id = %device_id,
                        error = %e,
                        "Failed to append batch"
                    );
                }
                Err(e.into())
            }
        }
    }

    fn package(&self, archiver: &Archiver, finished: FinishedSession) -> Result<SessionStopped> {
        let archive = archiver.package(
            &finished.session_id,
            &finished.session_dir,
            &finished.streams,
        )?;

        tracing::info!(
            session_id = %finished.session_id,
            duration_secs = (finished.stopped_at - finished.started_at).num_seconds(),
            devices = archive.devices.len(),
            "Session archived"
        );

        Ok(SessionStopped {
            session_id: finished.session_id,
            archive,
        })
    }
}
