//! Recording session state machine
//!
//! The controller owns the single "current session" slot. `start` and `stop`
//! take its write lock; ingestion only takes the read lock long enough to
//! clone the `Arc<ActiveSession>` handle. Stopping takes the session out of
//! the slot and closes the live [`SessionEpoch`] in one critical section, so
//! a stream handle obtained before the stop can no longer commit a write
//! once the stop has returned.
//!
//! The controller never touches disk.

use crate::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use sensorlog_core::{Error, Result, SessionEpoch, SessionId, SessionStatus};
use sensorlog_storage::DeviceStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The session currently recording
pub struct ActiveSession {
    id: SessionId,
    version: u64,
    started_at: DateTime<Utc>,
    registry: SessionRegistry,
}

impl ActiveSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// Result of `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    /// True when a session was already recording and was left untouched
    pub already_running: bool,
}

/// A stopped session, handed over to the archiver
#[derive(Debug)]
pub struct FinishedSession {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub session_dir: PathBuf,
    pub streams: Vec<Arc<DeviceStream>>,
}

/// Result of `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<SessionId>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ControllerState {
    active: Option<Arc<ActiveSession>>,
    /// Last version handed out; versions are never reused
    last_version: u64,
    last_id: Option<SessionId>,
}

/// Idle/Recording state machine
pub struct SessionController {
    data_dir: PathBuf,
    epoch: Arc<SessionEpoch>,
    state: RwLock<ControllerState>,
}

impl SessionController {
    /// Create a controller in the idle state
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            epoch: Arc::new(SessionEpoch::new()),
            state: RwLock::new(ControllerState::default()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Start recording, or report the session already recording
    pub fn start(&self) -> StartOutcome {
        let mut state = self.write();

        if let Some(active) = &state.active {
            tracing::debug!(session_id = %active.id, "Start requested while already recording");
            return StartOutcome {
                session_id: active.id.clone(),
                started_at: active.started_at,
                already_running: true,
            };
        }

        let started_at = Utc::now();
        let id = SessionId::next_after(&started_at, state.last_id.as_ref());
        let version = state.last_version + 1;

        let registry = SessionRegistry::new(
            self.data_dir.join(id.as_str()),
            version,
            Arc::clone(&self.epoch),
        );

        state.last_version = version;
        state.last_id = Some(id.clone());
        state.active = Some(Arc::new(ActiveSession {
            id: id.clone(),
            version,
            started_at,
            registry,
        }));
        self.epoch.open(version);

        tracing::info!(session_id = %id, version, "Recording session started");

        StartOutcome {
            session_id: id,
            started_at,
            already_running: false,
        }
    }

    /// Stop recording and hand over the session's streams
    pub fn stop(&self) -> Result<FinishedSession> {
        let mut state = self.write();

        let active = state.active.take().ok_or(Error::NoActiveSession)?;
        self.epoch.close();
        let streams = active.registry.streams();
        drop(state);

        tracing::info!(
            session_id = %active.id,
            devices = streams.len(),
            "Recording session stopped"
        );

        Ok(FinishedSession {
            session_id: active.id.clone(),
            started_at: active.started_at,
            stopped_at: Utc::now(),
            session_dir: active.registry.session_dir().to_path_buf(),
            streams,
        })
    }

    /// Current status; read-only
    pub fn status(&self) -> StatusSnapshot {
        match self.current() {
            Some(active) => StatusSnapshot {
                status: SessionStatus::Recording,
                session_id: Some(active.id.clone()),
                started_at: Some(active.started_at),
            },
            None => StatusSnapshot {
                status: SessionStatus::Idle,
                session_id: None,
                started_at: None,
            },
        }
    }

    /// Handle to the recording session, if any
    pub fn current(&self) -> Option<Arc<ActiveSession>> {
        self.read().active.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, ControllerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ControllerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
